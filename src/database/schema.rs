// Mirrors migrations/2024-06-01-000000_create_registry/up.sql
// Regenerate with: diesel print-schema --database-url=$DATABASE_URL

// Target series tables are not listed here: their names come from the
// registry at runtime and are created by SeriesRepository::ensure_table.
diesel::table! {
    resource_registry (resource_id) {
        resource_id -> Int4,
        resource_name -> Varchar,
        data_type -> Varchar,
        target_table -> Varchar,
        api_function -> Nullable<Varchar>,
        api_interval -> Nullable<Varchar>,
        api_endpoint -> Text,
        description -> Nullable<Text>,
        is_active -> Bool,
        registered_at -> Timestamptz,
    }
}

diesel::table! {
    currency_pairs (pair_id) {
        pair_id -> Int4,
        base_currency -> Varchar,
        quote_currency -> Varchar,
        is_active -> Bool,
    }
}

diesel::allow_tables_to_appear_in_same_query!(resource_registry, currency_pairs,);
