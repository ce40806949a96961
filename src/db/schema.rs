//! Handwritten Diesel schema declarations used by the row structs.
//!
//! Migrations define the actual tables and constraints. This module only
//! provides `diesel::table!` declarations so we can derive Insertable/Queryable
//! in a type-safe way without running `diesel print-schema`.

diesel::table! {
    machines (id) {
        id -> BigInt,
        name -> Text,
        machine_type -> Text,
        zone -> Text,
        rated_power_kw -> Double,
    }
}

// Hypertable partitioned on `time`
diesel::table! {
    readings (id, time) {
        id -> BigInt,
        time -> Timestamptz,
        machine_id -> BigInt,
        power_kw -> Double,
        temperature -> Nullable<Double>,
        speed_percent -> Nullable<Double>,
        is_on -> Bool,
    }
}

// Hypertable partitioned on `time`
diesel::table! {
    decisions (id, time) {
        id -> BigInt,
        time -> Timestamptz,
        machine_id -> BigInt,
        action_type -> Text,
        reason -> Text,
    }
}

diesel::joinable!(readings -> machines (machine_id));
diesel::joinable!(decisions -> machines (machine_id));

diesel::allow_tables_to_appear_in_same_query!(machines, readings, decisions);
