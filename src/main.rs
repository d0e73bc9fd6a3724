use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use routine_os::auth::{AuthClient, SessionFile};
use routine_os::config::Config;
use routine_os::domains::{Frequency, HabitStatus, Purpose, TimeBlock};
use routine_os::error::{Result, RoutineOsError};
use routine_os::interfaces::providers::{ChatMessage, LlmProvider};
use routine_os::prefs::PreferencesFile;
use routine_os::providers::OpenAiProvider;
use routine_os::services::coach::{CoachRequest, CoachService};
use routine_os::services::likelihood::{LikelihoodRequest, LikelihoodService};
use routine_os::services::routine::{
    local_today, HabitInput, RoutineService, SubHabitInput, SystemInput,
};
use routine_os::state::Theme;
use routine_os::vault;

#[derive(Parser, Debug)]
#[command(name = "routine-os")]
#[command(about = "Systems, habits and today's routine from the terminal")]
#[command(version = routine_os::VERSION)]
struct Cli {
    #[arg(long, global = true, env = "ROUTINE_OS_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "ROUTINE_OS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Habits scheduled for a day with their status.
    Today {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Systems,
    Habits {
        #[arg(long)]
        system: Option<String>,
    },
    AddSystem {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        icon: Option<String>,
    },
    AddHabit {
        #[arg(long)]
        system: String,
        name: String,
        /// Weekday indices, 0 = Sunday.
        #[arg(long, value_delimiter = ',', conflicts_with = "every")]
        days: Vec<u8>,
        #[arg(long)]
        every: Option<u32>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        minutes: Option<u32>,
        #[arg(long)]
        purpose: Option<String>,
        #[arg(long)]
        time_block: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "sub")]
        sub_habits: Vec<String>,
    },
    /// Set a habit's status, or a sub-habit's with `--sub`.
    Mark {
        id: String,
        status: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value_t = false)]
        sub: bool,
    },
    DeleteSystem {
        id: String,
    },
    DeleteHabit {
        id: String,
    },
    Analytics {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    Predict {
        #[arg(long)]
        window_days: Option<u32>,
    },
    Chat {
        #[arg(required = true)]
        message: Vec<String>,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "ROUTINE_OS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long, env = "ROUTINE_OS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Store or remove a credential in the OS keyring.
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
    /// Show the theme, or set it to `dark` or `light`.
    Theme {
        value: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SecretAction {
    Set {
        name: SecretName,
        #[arg(env = "ROUTINE_OS_SECRET_VALUE", hide_env_values = true)]
        value: String,
    },
    Clear {
        name: SecretName,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SecretName {
    OpenaiApiKey,
    SupabaseAnonKey,
    DaemonToken,
}

impl SecretName {
    fn vault_name(self) -> &'static str {
        match self {
            SecretName::OpenaiApiKey => vault::OPENAI_API_KEY_NAME,
            SecretName::SupabaseAnonKey => vault::SUPABASE_ANON_KEY_NAME,
            SecretName::DaemonToken => vault::DAEMON_TOKEN_NAME,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    routine_os::logging::init_tracing("routine_os_cli");
    let cli = Cli::parse();
    if cli.data_dir.is_some() {
        routine_os::runtime_paths::set_app_root_override(cli.data_dir.clone());
    }
    let config = Config::resolve(cli.config.as_deref())?;

    match cli.command {
        Command::Login { email, password } => login(&config, &email, &password).await,
        Command::Signup { email, password } => signup(&config, &email, &password).await,
        Command::Logout => logout(&config).await,
        Command::Secret { action } => secret(action),
        command => {
            let mut routine = open_routine(&config).await?;
            run_command(&config, &mut routine, command).await
        }
    }
}

async fn open_routine(config: &Config) -> Result<RoutineService> {
    let session = SessionFile::at_default_location().load();
    let store = routine_os::store::open_store(config, session.as_ref()).await?;
    let mut routine = RoutineService::new(
        store,
        PreferencesFile::new(config.preferences_path()),
        config.trend_days(),
    );
    routine.load().await?;
    Ok(routine)
}

fn provider(config: &Config) -> Option<Arc<dyn LlmProvider>> {
    OpenAiProvider::from_config(&config.openai())
        .map(|provider| Arc::new(provider) as Arc<dyn LlmProvider>)
}

fn auth_client(config: &Config) -> Result<AuthClient> {
    let (url, anon_key) = config
        .supabase
        .as_ref()
        .and_then(|supabase| supabase.endpoint())
        .ok_or_else(|| RoutineOsError::Config("supabase url and anon_key are required".to_string()))?;
    Ok(AuthClient::new(url, anon_key))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_command(config: &Config, routine: &mut RoutineService, command: Command) -> Result<()> {
    match command {
        Command::Today { date } => {
            let date = date.unwrap_or_else(local_today);
            let entries = routine.today(date);
            println!("Today · {}", date.format("%A, %B %-d"));
            if entries.is_empty() {
                println!("Nothing scheduled.");
            }
            for entry in entries {
                let mark = if entry.status == HabitStatus::Completed { "x" } else { " " };
                println!(
                    "[{mark}] {} ({}) · {} · streak {} · {}",
                    entry.name,
                    entry.system_name,
                    entry.status.label(),
                    entry.streak,
                    entry.habit_id
                );
                for sub in entry.sub_habits {
                    let mark = if sub.status == HabitStatus::Completed { "x" } else { " " };
                    println!("    [{mark}] {} · {}", sub.name, sub.id);
                }
            }
        }
        Command::Systems => {
            for system in routine.state().ordered_systems() {
                let count = routine.state().habits_for_system(&system.id).count();
                println!("{} {} · {} habits · {}", system.icon, system.name, count, system.id);
            }
        }
        Command::Habits { system } => {
            let state = routine.state();
            for habit in state
                .habits
                .iter()
                .filter(|habit| system.as_deref().map_or(true, |id| habit.system_id == id))
            {
                println!(
                    "{} · {} · {} · {}",
                    habit.name,
                    habit.frequency.label(),
                    habit.status.label(),
                    habit.id
                );
            }
        }
        Command::AddSystem {
            name,
            description,
            color,
            icon,
        } => {
            let system = routine
                .create_system(SystemInput {
                    id: None,
                    name,
                    description,
                    color,
                    icon,
                })
                .await?;
            println!("Created system {} ({})", system.name, system.id);
        }
        Command::AddHabit {
            system,
            name,
            days,
            every,
            start,
            minutes,
            purpose,
            time_block,
            notes,
            sub_habits,
        } => {
            let frequency = match (every, days.is_empty()) {
                (Some(interval), _) => Frequency::every_x_days(interval),
                (None, false) => Frequency::days_of_week(days),
                (None, true) => Frequency::Daily,
            };
            let purpose = purpose
                .map(|value| {
                    Purpose::parse(&value).ok_or_else(|| {
                        RoutineOsError::Validation(format!("unknown purpose: {value}"))
                    })
                })
                .transpose()?;
            let preferred_time_block = time_block
                .map(|value| {
                    TimeBlock::parse(&value).ok_or_else(|| {
                        RoutineOsError::Validation(format!("unknown time block: {value}"))
                    })
                })
                .transpose()?;
            let habit = routine
                .create_habit(
                    HabitInput {
                        id: None,
                        system_id: system,
                        name,
                        frequency: Some(frequency),
                        start_date: start,
                        duration_minutes: minutes,
                        notes,
                        purpose,
                        preferred_time_block,
                        sub_habits: Some(
                            sub_habits
                                .into_iter()
                                .map(|name| SubHabitInput {
                                    id: None,
                                    name,
                                    notes: None,
                                })
                                .collect(),
                        ),
                    },
                    local_today(),
                )
                .await?;
            println!("Created habit {} ({})", habit.name, habit.id);
        }
        Command::Mark {
            id,
            status,
            date,
            sub,
        } => {
            let status: HabitStatus = status.parse()?;
            let date = date.unwrap_or_else(local_today);
            if sub {
                let parent = routine.set_sub_habit_status(&id, status, date)?;
                println!("Sub-habit {id} is {}; habit is {}", status.label(), parent.label());
            } else {
                let habit = routine.set_habit_status(&id, status, date).await?;
                println!("{} is {} on {date}", habit.name, status.label());
            }
        }
        Command::DeleteSystem { id } => {
            routine.delete_system(&id).await?;
            println!("Deleted system {id} and its habits");
        }
        Command::DeleteHabit { id } => {
            routine.delete_habit(&id).await?;
            println!("Deleted habit {id}");
        }
        Command::Analytics { json } => {
            let summary = routine.analytics(local_today());
            if json {
                return print_json(&summary);
            }
            println!(
                "Today: {}/{} completed ({}%)",
                summary.today.completed, summary.today.total, summary.today_percent
            );
            for row in &summary.by_system {
                println!("  {} · {}/{} ({}%)", row.name, row.completed, row.total, row.percent);
            }
            println!("Last {} days:", summary.trend.len());
            for point in &summary.trend {
                println!(
                    "  {} · {}/{} ({}%)",
                    point.full_label, point.completed_habits, point.total_habits, point.completion_rate
                );
            }
        }
        Command::Predict { window_days } => {
            let service = LikelihoodService::new(provider(config));
            let response = service
                .predict(&LikelihoodRequest {
                    habits: Some(routine.likelihood_payload(local_today())),
                    window_days,
                })
                .await?;
            print_json(&response)?;
        }
        Command::Chat { message } => {
            let service = CoachService::new(provider(config));
            let reply = service
                .reply(&CoachRequest {
                    messages: vec![ChatMessage::user(message.join(" "))],
                    context: Some(routine.coach_context(local_today())),
                })
                .await?;
            println!("{}", reply.reply);
        }
        Command::Theme { value } => match value {
            Some(value) => {
                let theme: Theme = value.parse()?;
                routine.set_theme(theme)?;
                println!("Theme set to {theme}");
            }
            None => println!("{}", routine.state().theme),
        },
        Command::Login { .. } | Command::Signup { .. } | Command::Logout | Command::Secret { .. } => {}
    }
    Ok(())
}

async fn login(config: &Config, email: &str, password: &str) -> Result<()> {
    let session = auth_client(config)?
        .sign_in_with_password(email, password)
        .await?;
    SessionFile::at_default_location().save(&session)?;
    println!("Signed in as {}", session.user.email.as_deref().unwrap_or(email));
    Ok(())
}

async fn signup(config: &Config, email: &str, password: &str) -> Result<()> {
    match auth_client(config)?.sign_up(email, password).await? {
        Some(session) => {
            SessionFile::at_default_location().save(&session)?;
            println!("Account created; signed in as {email}");
        }
        None => println!("Account created. Check {email} to confirm, then run `routine-os login`."),
    }
    Ok(())
}

fn secret(action: SecretAction) -> Result<()> {
    match action {
        SecretAction::Set { name, value } => {
            let value = value.trim();
            if value.is_empty() {
                return Err(RoutineOsError::Validation("secret value is empty".to_string()));
            }
            vault::set_secret(name.vault_name(), value)?;
            println!("Stored {}", name.vault_name());
        }
        SecretAction::Clear { name } => {
            vault::delete_secret(name.vault_name())?;
            println!("Removed {}", name.vault_name());
        }
    }
    Ok(())
}

async fn logout(config: &Config) -> Result<()> {
    let sessions = SessionFile::at_default_location();
    if let Some(session) = sessions.load() {
        if let Err(err) = auth_client(config)?.sign_out(&session.access_token).await {
            tracing::warn!(error = %err, "Remote sign-out failed");
        }
    }
    sessions.clear()?;
    println!("Signed out");
    Ok(())
}
