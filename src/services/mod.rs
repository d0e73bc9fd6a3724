pub mod coach;
pub mod likelihood;
pub mod routine;

pub use coach::CoachService;
pub use likelihood::LikelihoodService;
pub use routine::RoutineService;
