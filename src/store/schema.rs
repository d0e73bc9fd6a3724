diesel::table! {
    systems (id) {
        id -> Text,
        name -> Text,
        description -> Text,
        color -> Text,
        icon -> Text,
        order_index -> Integer,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    habits (id) {
        id -> Text,
        system_id -> Text,
        name -> Text,
        frequency -> Text,
        start_date -> Nullable<Text>,
        duration_minutes -> Integer,
        notes -> Text,
        purpose -> Nullable<Text>,
        preferred_time_block -> Nullable<Text>,
        status -> Text,
        last_completed_on -> Nullable<Text>,
        completion_history -> Text,
        sub_habits -> Text,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(systems, habits);
