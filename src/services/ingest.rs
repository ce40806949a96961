//! Snapshot persistence between a `TelemetryDb` and PostgreSQL/TimescaleDB.

use crate::db::models::{DecisionRow, MachineRow, ReadingRow};
use crate::db::schema;
use crate::models::{Decision, Machine, Reading};
use crate::store::TelemetryDb;
use diesel::prelude::*;
use diesel::PgConnection;
use log::info;

// Keeps every INSERT well below PostgreSQL's 65535 bind parameter limit.
const INSERT_CHUNK: usize = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub machines: usize,
    pub readings: usize,
    pub decisions: usize,
}

fn insert_readings(conn: &mut PgConnection, rows: &[ReadingRow]) -> QueryResult<usize> {
    use schema::readings::dsl as R;

    let mut inserted = 0;
    for chunk in rows.chunks(INSERT_CHUNK) {
        inserted += diesel::insert_into(R::readings)
            .values(chunk)
            .on_conflict((R::id, R::time))
            .do_nothing()
            .execute(conn)?;
    }
    Ok(inserted)
}

fn insert_decisions(conn: &mut PgConnection, rows: &[DecisionRow]) -> QueryResult<usize> {
    use schema::decisions::dsl as D;

    let mut inserted = 0;
    for chunk in rows.chunks(INSERT_CHUNK) {
        inserted += diesel::insert_into(D::decisions)
            .values(chunk)
            .on_conflict((D::id, D::time))
            .do_nothing()
            .execute(conn)?;
    }
    Ok(inserted)
}

/// Replace the persisted state with the current contents of `db`, in one
/// transaction.
pub fn save_snapshot(conn: &mut PgConnection, db: &TelemetryDb) -> Result<SnapshotCounts, String> {
    let (machines, readings, decisions) = db.snapshot();
    let machine_rows: Vec<MachineRow> = machines.iter().map(MachineRow::from).collect();
    let reading_rows = readings
        .iter()
        .map(ReadingRow::from_reading)
        .collect::<Result<Vec<_>, _>>()?;
    let decision_rows = decisions
        .iter()
        .map(DecisionRow::from_decision)
        .collect::<Result<Vec<_>, _>>()?;

    let counts = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            use schema::decisions::dsl as D;
            use schema::machines::dsl as M;
            use schema::readings::dsl as R;

            diesel::delete(D::decisions).execute(conn)?;
            diesel::delete(R::readings).execute(conn)?;
            diesel::delete(M::machines).execute(conn)?;

            let machines = diesel::insert_into(M::machines).values(&machine_rows).execute(conn)?;
            let readings = insert_readings(conn, &reading_rows)?;
            let decisions = insert_decisions(conn, &decision_rows)?;
            Ok(SnapshotCounts {
                machines,
                readings,
                decisions,
            })
        })
        .map_err(|e| format!("save snapshot failed: {}", e))?;

    info!(
        "Persisted snapshot (machines={}, readings={}, decisions={})",
        counts.machines, counts.readings, counts.decisions
    );
    Ok(counts)
}

/// Load everything stored in PostgreSQL into `db`, keeping ids.
pub fn load_snapshot(conn: &mut PgConnection, db: &TelemetryDb) -> Result<SnapshotCounts, String> {
    use schema::decisions::dsl as D;
    use schema::machines::dsl as M;
    use schema::readings::dsl as R;

    let machines: Vec<Machine> = M::machines
        .order(M::id.asc())
        .load::<MachineRow>(conn)
        .map_err(|e| format!("load machines failed: {}", e))?
        .into_iter()
        .map(Machine::from)
        .collect();

    let readings = R::readings
        .order((R::time.asc(), R::machine_id.asc(), R::id.asc()))
        .load::<ReadingRow>(conn)
        .map_err(|e| format!("load readings failed: {}", e))?
        .into_iter()
        .map(ReadingRow::into_reading)
        .collect::<Result<Vec<Reading>, _>>()?;

    let decisions = D::decisions
        .order((D::time.asc(), D::machine_id.asc(), D::id.asc()))
        .load::<DecisionRow>(conn)
        .map_err(|e| format!("load decisions failed: {}", e))?
        .into_iter()
        .map(DecisionRow::into_decision)
        .collect::<Result<Vec<Decision>, _>>()?;

    let counts = SnapshotCounts {
        machines: machines.len(),
        readings: readings.len(),
        decisions: decisions.len(),
    };
    db.restore(machines, readings, decisions)
        .map_err(|e| format!("restore snapshot failed: {}", e))?;

    info!(
        "Loaded snapshot (machines={}, readings={}, decisions={})",
        counts.machines, counts.readings, counts.decisions
    );
    Ok(counts)
}
