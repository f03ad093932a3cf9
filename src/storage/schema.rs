// Subset of the analysis platform's relational schema touched by the purge.

diesel::table! {
    tasks (id) {
        id -> Integer,
        target -> Text,
        added_on -> Timestamp,
        status -> Text,
        sample_id -> Nullable<Integer>,
        submit_id -> Nullable<Integer>,
    }
}

diesel::table! {
    samples (id) {
        id -> Integer,
        sha256 -> Text,
    }
}

diesel::table! {
    submit (id) {
        id -> Integer,
        added -> Timestamp,
    }
}

diesel::table! {
    errors (id) {
        id -> Integer,
        message -> Text,
        task_id -> Integer,
    }
}

diesel::table! {
    guests (id) {
        id -> Integer,
        name -> Text,
        task_id -> Integer,
    }
}

diesel::table! {
    tags (id) {
        id -> Integer,
        name -> Text,
    }
}

diesel::table! {
    tasks_tags (task_id, tag_id) {
        task_id -> Integer,
        tag_id -> Integer,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    tasks,
    samples,
    submit,
    errors,
    guests,
    tags,
    tasks_tags,
);
