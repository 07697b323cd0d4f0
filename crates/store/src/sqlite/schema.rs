// Hand-written to match spec §6's persistent layout exactly (four
// tables: node / leaf / inner / orphan); there is no running database to
// generate this from via `diesel print-schema`, so it is maintained
// alongside `migrations/` by hand, the way the teacher's
// `datastore/postgres/schema.rs` states at its own top ("@generated
// automatically by Diesel CLI" — kept in sync manually here instead).

diesel::table! {
    node (hash) {
        hash -> Text,
        root_version -> Nullable<BigInt>,
    }
}

diesel::table! {
    leaf (hash) {
        hash -> Text,
        key -> Binary,
        value -> Binary,
        version -> BigInt,
    }
}

diesel::table! {
    inner (hash) {
        hash -> Text,
        key -> Binary,
        height -> Integer,
        size -> BigInt,
        left -> Text,
        right -> Text,
        version -> BigInt,
    }
}

diesel::table! {
    orphan (hash) {
        hash -> Text,
        until -> BigInt,
    }
}

diesel::joinable!(leaf -> node (hash));
diesel::joinable!(inner -> node (hash));
diesel::joinable!(orphan -> node (hash));

diesel::allow_tables_to_appear_in_same_query!(node, leaf, inner, orphan);
