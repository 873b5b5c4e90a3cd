//src/db.rs
use crate::models::{
    Equipment, Exercise, ExerciseCategory, ExerciseSet, ForgeUser, MuscleGroup, PersonalRecord,
    RecordKind, SetMetrics, SetType, TrackingType, Workout, WorkoutExercise, WorkoutStatus,
    WorkoutType,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row, ToSql};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

// Custom Error type for store operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database connection failed")]
    Connection(#[from] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing database file")]
    Io(#[from] std::io::Error),
    #[error("Database query failed: {0}")]
    QueryFailed(rusqlite::Error),
    #[error("Database insert failed: {0}")]
    InsertFailed(rusqlite::Error),
    #[error("Database delete failed: {0}")]
    DeleteFailed(rusqlite::Error),
    #[error("Workout not found: {0}")]
    WorkoutNotFound(Uuid),
    #[error("Exercise not found: {0}")]
    ExerciseNotFound(Uuid),
    #[error("Exercise name must be unique (case-insensitive): '{0}' already exists.")]
    ExerciseNameNotUnique(String),
}

const DB_FILE_NAME: &str = "forge.sqlite";

/// Gets the path to the SQLite database file within the app's data directory.
pub fn get_db_path() -> Result<PathBuf, Error> {
    let data_dir = dirs::data_dir().ok_or(Error::DataDir)?;
    let app_dir = data_dir.join("forge");
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Opens a connection to the SQLite database.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, Error> {
    let conn = Connection::open(path).map_err(Error::Connection)?;
    Ok(conn)
}

/// Initializes the database tables if they don't exist.
pub fn init_db(conn: &Connection) -> Result<(), Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT,
            total_workouts INTEGER NOT NULL,
            total_duration_secs INTEGER NOT NULL,
            total_volume REAL NOT NULL,
            current_streak INTEGER NOT NULL,
            longest_streak INTEGER NOT NULL,
            personal_records INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )
    .map_err(Error::Connection)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exercises (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            primary_muscle TEXT NOT NULL,
            secondary_muscles TEXT,
            equipment TEXT,
            category TEXT,
            tracking_type TEXT NOT NULL,
            is_system INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .map_err(Error::Connection)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workouts (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT,
            notes TEXT,
            started_at TEXT NOT NULL, -- Store as RFC3339 string
            ended_at TEXT,
            paused_duration_secs INTEGER NOT NULL,
            paused_at TEXT,
            status TEXT NOT NULL CHECK(status IN ('inProgress', 'paused', 'completed', 'cancelled')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )
    .map_err(Error::Connection)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workout_exercises (
            id TEXT PRIMARY KEY,
            workout_id TEXT NOT NULL,
            exercise_id TEXT NOT NULL,
            exercise_name TEXT NOT NULL, -- Denormalized for display stability
            primary_muscle TEXT NOT NULL,
            tracking_type TEXT NOT NULL,
            ord INTEGER NOT NULL,
            notes TEXT,
            rest_between_sets_secs INTEGER,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .map_err(Error::Connection)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exercise_sets (
            id TEXT PRIMARY KEY,
            workout_exercise_id TEXT NOT NULL,
            set_number INTEGER NOT NULL,
            set_type TEXT NOT NULL,
            weight REAL,
            reps INTEGER,
            duration_secs INTEGER,
            distance_m REAL,
            calories INTEGER,
            is_completed INTEGER NOT NULL,
            completed_at TEXT,
            is_personal_record INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .map_err(Error::Connection)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS personal_records (
            id TEXT PRIMARY KEY,
            exercise_id TEXT NOT NULL,
            exercise_name TEXT NOT NULL,
            kind TEXT NOT NULL,
            value REAL NOT NULL,
            previous_value REAL,
            achieved_at TEXT NOT NULL,
            workout_id TEXT
        )",
        [],
    )
    .map_err(Error::Connection)?;

    // Indexes for common lookups
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workouts_started_at ON workouts(started_at)",
        [],
    )
    .map_err(Error::Connection)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workouts_status ON workouts(status)",
        [],
    )
    .map_err(Error::Connection)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workout_exercises_workout ON workout_exercises(workout_id)",
        [],
    )
    .map_err(Error::Connection)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exercise_sets_parent ON exercise_sets(workout_exercise_id)",
        [],
    )
    .map_err(Error::Connection)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_personal_records_exercise ON personal_records(exercise_id, kind)",
        [],
    )
    .map_err(Error::Connection)?;

    debug!("database schema initialized");
    Ok(())
}

// --- Row conversion helpers ---

fn parse_timestamp(idx: usize, value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_enum<T: FromStr>(idx: usize, value: &str) -> Result<T, rusqlite::Error> {
    value.parse::<T>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(format!(
                "invalid enum value '{value}'"
            )),
        )
    })
}

fn parse_uuid(idx: usize, value: &str) -> Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Splits set metrics into the nullable measurement columns.
fn metrics_to_columns(
    metrics: &SetMetrics,
) -> (
    Option<f64>,
    Option<u32>,
    Option<u32>,
    Option<f64>,
    Option<u32>,
) {
    match *metrics {
        SetMetrics::WeightReps { weight, reps } => (weight, reps, None, None, None),
        SetMetrics::Reps { reps } => (None, reps, None, None, None),
        SetMetrics::Duration { secs } => (None, None, secs, None, None),
        SetMetrics::DistanceTime { meters, secs } => (None, None, secs, meters, None),
        SetMetrics::Distance { meters } => (None, None, None, meters, None),
        SetMetrics::Calories { kcal } => (None, None, None, None, kcal),
    }
}

/// Rebuilds the tagged metrics from the measurement columns; the parent
/// entry's tracking type picks the variant.
fn metrics_from_columns(
    tracking: TrackingType,
    weight: Option<f64>,
    reps: Option<u32>,
    duration_secs: Option<u32>,
    distance_m: Option<f64>,
    calories: Option<u32>,
) -> SetMetrics {
    match tracking {
        TrackingType::WeightAndReps => SetMetrics::WeightReps { weight, reps },
        TrackingType::RepsOnly => SetMetrics::Reps { reps },
        TrackingType::TimeOnly => SetMetrics::Duration {
            secs: duration_secs,
        },
        TrackingType::DistanceAndTime => SetMetrics::DistanceTime {
            meters: distance_m,
            secs: duration_secs,
        },
        TrackingType::DistanceOnly => SetMetrics::Distance { meters: distance_m },
        TrackingType::CaloriesOnly => SetMetrics::Calories { kcal: calories },
    }
}

// --- User Functions ---

/// Fetches the single profile row, if one exists.
pub fn get_user(conn: &Connection) -> Result<Option<ForgeUser>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT id, display_name, total_workouts, total_duration_secs, total_volume,
                    current_streak, longest_streak, personal_records, created_at, updated_at
             FROM users LIMIT 1",
        )
        .map_err(Error::QueryFailed)?;
    stmt.query_row([], map_row_to_user)
        .optional()
        .map_err(Error::QueryFailed)
}

fn map_row_to_user(row: &Row) -> Result<ForgeUser, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;
    let total_duration_secs: i64 = row.get(3)?;
    Ok(ForgeUser {
        id: parse_uuid(0, &id_str)?,
        display_name: row.get(1)?,
        total_workouts: row.get(2)?,
        total_duration_secs: total_duration_secs.max(0) as u64,
        total_volume: row.get(4)?,
        current_streak: row.get(5)?,
        longest_streak: row.get(6)?,
        personal_records: row.get(7)?,
        created_at: parse_timestamp(8, &created_str)?,
        updated_at: parse_timestamp(9, &updated_str)?,
    })
}

pub fn save_user(conn: &Connection, user: &ForgeUser) -> Result<(), Error> {
    write_user(conn, user).map_err(Error::InsertFailed)
}

fn write_user(conn: &Connection, user: &ForgeUser) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO users (id, display_name, total_workouts, total_duration_secs,
            total_volume, current_streak, longest_streak, personal_records, created_at, updated_at)
         VALUES (:id, :name, :workouts, :duration, :volume, :streak, :longest, :records,
            :created, :updated)",
        named_params! {
            ":id": user.id.to_string(),
            ":name": user.display_name,
            ":workouts": user.total_workouts,
            ":duration": user.total_duration_secs as i64,
            ":volume": user.total_volume,
            ":streak": user.current_streak,
            ":longest": user.longest_streak,
            ":records": user.personal_records,
            ":created": user.created_at.to_rfc3339(),
            ":updated": user.updated_at.to_rfc3339(),
        },
    )?;
    Ok(())
}

// --- Exercise Catalog Functions ---

pub fn save_exercise(conn: &Connection, exercise: &Exercise) -> Result<(), Error> {
    let secondary = exercise
        .secondary_muscles
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    match conn.execute(
        "INSERT INTO exercises (id, name, primary_muscle, secondary_muscles, equipment,
            category, tracking_type, is_system, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            exercise.id.to_string(),
            exercise.name,
            exercise.primary_muscle.to_string(),
            secondary,
            exercise.equipment.map(|e| e.to_string()),
            exercise.category.map(|c| c.to_string()),
            exercise.tracking_type.to_string(),
            exercise.is_system,
            exercise.created_at.to_rfc3339(),
        ],
    ) {
        Ok(_) => Ok(()),
        Err(e) => {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.code == rusqlite::ErrorCode::ConstraintViolation {
                    return Err(Error::ExerciseNameNotUnique(exercise.name.clone()));
                }
            }
            Err(Error::InsertFailed(e))
        }
    }
}

fn map_row_to_exercise(row: &Row) -> Result<Exercise, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let primary_str: String = row.get(2)?;
    let secondary_str: Option<String> = row.get(3)?;
    let equipment_str: Option<String> = row.get(4)?;
    let category_str: Option<String> = row.get(5)?;
    let tracking_str: String = row.get(6)?;
    let created_str: String = row.get(8)?;

    let secondary_muscles = secondary_str
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| parse_enum::<MuscleGroup>(3, s))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Exercise {
        id: parse_uuid(0, &id_str)?,
        name: row.get(1)?,
        primary_muscle: parse_enum(2, &primary_str)?,
        secondary_muscles,
        equipment: equipment_str
            .map(|s| parse_enum::<Equipment>(4, &s))
            .transpose()?,
        category: category_str
            .map(|s| parse_enum::<ExerciseCategory>(5, &s))
            .transpose()?,
        tracking_type: parse_enum(6, &tracking_str)?,
        is_system: row.get(7)?,
        created_at: parse_timestamp(8, &created_str)?,
    })
}

pub fn get_exercise(conn: &Connection, id: Uuid) -> Result<Option<Exercise>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, primary_muscle, secondary_muscles, equipment, category,
                    tracking_type, is_system, created_at
             FROM exercises WHERE id = ?1",
        )
        .map_err(Error::QueryFailed)?;
    stmt.query_row(params![id.to_string()], map_row_to_exercise)
        .optional()
        .map_err(Error::QueryFailed)
}

pub fn get_exercise_by_name(conn: &Connection, name: &str) -> Result<Option<Exercise>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, primary_muscle, secondary_muscles, equipment, category,
                    tracking_type, is_system, created_at
             FROM exercises WHERE name = ?1 COLLATE NOCASE",
        )
        .map_err(Error::QueryFailed)?;
    stmt.query_row(params![name], map_row_to_exercise)
        .optional()
        .map_err(Error::QueryFailed)
}

/// Lists catalog exercises, optionally filtered by muscle and/or a name search.
pub fn list_exercises(
    conn: &Connection,
    muscle: Option<MuscleGroup>,
    search: Option<&str>,
) -> Result<Vec<Exercise>, Error> {
    let mut sql = "SELECT id, name, primary_muscle, secondary_muscles, equipment, category,
                          tracking_type, is_system, created_at
                   FROM exercises WHERE 1=1"
        .to_string();
    let mut params_map: HashMap<String, Box<dyn ToSql>> = HashMap::new();

    if let Some(m) = muscle {
        sql.push_str(" AND (primary_muscle = :muscle OR secondary_muscles LIKE :muscle_like)");
        params_map.insert(":muscle".into(), Box::new(m.to_string()));
        params_map.insert(":muscle_like".into(), Box::new(format!("%{m}%")));
    }
    if let Some(s) = search {
        sql.push_str(" AND name LIKE :search");
        params_map.insert(":search".into(), Box::new(format!("%{s}%")));
    }
    sql.push_str(" ORDER BY name ASC");

    let params_for_query: Vec<(&str, &dyn ToSql)> = params_map
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_ref()))
        .collect();

    let mut stmt = conn.prepare(&sql).map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map(params_for_query.as_slice(), map_row_to_exercise)
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

// --- Workout Aggregate Functions ---

/// Saves the full workout graph atomically: the workout row is upserted and
/// all child rows are replaced inside one transaction, so a reader never sees
/// a partially renumbered graph.
pub fn save_workout(conn: &mut Connection, workout: &Workout) -> Result<(), Error> {
    let tx = conn.transaction().map_err(Error::Connection)?;
    write_workout_tx(&tx, workout).map_err(Error::InsertFailed)?;
    tx.commit().map_err(Error::Connection)?;
    Ok(())
}

/// Finalization writes the workout graph and the user's stat row in a single
/// transaction.
pub fn save_workout_and_user(
    conn: &mut Connection,
    workout: &Workout,
    user: &ForgeUser,
) -> Result<(), Error> {
    let tx = conn.transaction().map_err(Error::Connection)?;
    write_workout_tx(&tx, workout).map_err(Error::InsertFailed)?;
    write_user(&tx, user).map_err(Error::InsertFailed)?;
    tx.commit().map_err(Error::Connection)?;
    Ok(())
}

/// Set completion persists the workout graph, any fresh personal records and
/// the updated record tally together, so the graph never shows a flagged set
/// without its record row.
pub fn save_set_completion(
    conn: &mut Connection,
    workout: &Workout,
    records: &[PersonalRecord],
    user: Option<&ForgeUser>,
) -> Result<(), Error> {
    let tx = conn.transaction().map_err(Error::Connection)?;
    write_workout_tx(&tx, workout).map_err(Error::InsertFailed)?;
    for record in records {
        write_personal_record(&tx, record).map_err(Error::InsertFailed)?;
    }
    if let Some(user) = user {
        write_user(&tx, user).map_err(Error::InsertFailed)?;
    }
    tx.commit().map_err(Error::Connection)?;
    Ok(())
}

fn write_workout_tx(tx: &Connection, workout: &Workout) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT OR REPLACE INTO workouts (id, kind, name, notes, started_at, ended_at,
            paused_duration_secs, paused_at, status, created_at, updated_at)
         VALUES (:id, :kind, :name, :notes, :started, :ended, :paused_secs, :paused_at,
            :status, :created, :updated)",
        named_params! {
            ":id": workout.id.to_string(),
            ":kind": workout.kind.to_string(),
            ":name": workout.name,
            ":notes": workout.notes,
            ":started": workout.started_at.to_rfc3339(),
            ":ended": workout.ended_at.map(|t| t.to_rfc3339()),
            ":paused_secs": workout.paused_duration_secs,
            ":paused_at": workout.paused_at.map(|t| t.to_rfc3339()),
            ":status": workout.status.to_string(),
            ":created": workout.created_at.to_rfc3339(),
            ":updated": workout.updated_at.to_rfc3339(),
        },
    )?;

    delete_children_tx(tx, workout.id)?;

    for entry in &workout.exercises {
        tx.execute(
            "INSERT INTO workout_exercises (id, workout_id, exercise_id, exercise_name,
                primary_muscle, tracking_type, ord, notes, rest_between_sets_secs, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id.to_string(),
                workout.id.to_string(),
                entry.exercise_id.to_string(),
                entry.exercise_name,
                entry.primary_muscle.to_string(),
                entry.tracking_type.to_string(),
                entry.order,
                entry.notes,
                entry.rest_between_sets_secs,
                entry.created_at.to_rfc3339(),
            ],
        )?;

        for set in &entry.sets {
            let (weight, reps, duration_secs, distance_m, calories) =
                metrics_to_columns(&set.metrics);
            tx.execute(
                "INSERT INTO exercise_sets (id, workout_exercise_id, set_number, set_type,
                    weight, reps, duration_secs, distance_m, calories, is_completed,
                    completed_at, is_personal_record, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    set.id.to_string(),
                    entry.id.to_string(),
                    set.set_number,
                    set.set_type.to_string(),
                    weight,
                    reps,
                    duration_secs,
                    distance_m,
                    calories,
                    set.is_completed,
                    set.completed_at.map(|t| t.to_rfc3339()),
                    set.is_personal_record,
                    set.created_at.to_rfc3339(),
                ],
            )?;
        }
    }
    Ok(())
}

fn delete_children_tx(tx: &Connection, workout_id: Uuid) -> Result<(), rusqlite::Error> {
    tx.execute(
        "DELETE FROM exercise_sets WHERE workout_exercise_id IN
            (SELECT id FROM workout_exercises WHERE workout_id = ?1)",
        params![workout_id.to_string()],
    )?;
    tx.execute(
        "DELETE FROM workout_exercises WHERE workout_id = ?1",
        params![workout_id.to_string()],
    )?;
    Ok(())
}

fn map_row_to_workout_shell(row: &Row) -> Result<Workout, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let started_str: String = row.get(4)?;
    let ended_str: Option<String> = row.get(5)?;
    let paused_at_str: Option<String> = row.get(7)?;
    let status_str: String = row.get(8)?;
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;

    Ok(Workout {
        id: parse_uuid(0, &id_str)?,
        kind: parse_enum::<WorkoutType>(1, &kind_str)?,
        name: row.get(2)?,
        notes: row.get(3)?,
        started_at: parse_timestamp(4, &started_str)?,
        ended_at: ended_str.map(|s| parse_timestamp(5, &s)).transpose()?,
        paused_duration_secs: row.get(6)?,
        paused_at: paused_at_str.map(|s| parse_timestamp(7, &s)).transpose()?,
        status: parse_enum::<WorkoutStatus>(8, &status_str)?,
        exercises: Vec::new(),
        created_at: parse_timestamp(9, &created_str)?,
        updated_at: parse_timestamp(10, &updated_str)?,
    })
}

fn load_children(conn: &Connection, workout: &mut Workout) -> Result<(), Error> {
    let mut stmt = conn
        .prepare(
            "SELECT id, exercise_id, exercise_name, primary_muscle, tracking_type, ord, notes,
                    rest_between_sets_secs, created_at
             FROM workout_exercises WHERE workout_id = ?1 ORDER BY ord ASC",
        )
        .map_err(Error::QueryFailed)?;
    let entries = stmt
        .query_map(params![workout.id.to_string()], |row| {
            let id_str: String = row.get(0)?;
            let exercise_id_str: String = row.get(1)?;
            let muscle_str: String = row.get(3)?;
            let tracking_str: String = row.get(4)?;
            let created_str: String = row.get(8)?;
            Ok(WorkoutExercise {
                id: parse_uuid(0, &id_str)?,
                exercise_id: parse_uuid(1, &exercise_id_str)?,
                exercise_name: row.get(2)?,
                primary_muscle: parse_enum::<MuscleGroup>(3, &muscle_str)?,
                tracking_type: parse_enum::<TrackingType>(4, &tracking_str)?,
                order: row.get(5)?,
                notes: row.get(6)?,
                rest_between_sets_secs: row.get(7)?,
                sets: Vec::new(),
                created_at: parse_timestamp(8, &created_str)?,
            })
        })
        .map_err(Error::QueryFailed)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)?;

    let mut set_stmt = conn
        .prepare(
            "SELECT id, set_number, set_type, weight, reps, duration_secs, distance_m,
                    calories, is_completed, completed_at, is_personal_record, created_at
             FROM exercise_sets WHERE workout_exercise_id = ?1 ORDER BY set_number ASC",
        )
        .map_err(Error::QueryFailed)?;

    let mut loaded = Vec::with_capacity(entries.len());
    for mut entry in entries {
        let tracking = entry.tracking_type;
        let sets = set_stmt
            .query_map(params![entry.id.to_string()], |row| {
                let id_str: String = row.get(0)?;
                let set_type_str: String = row.get(2)?;
                let completed_str: Option<String> = row.get(9)?;
                let created_str: String = row.get(11)?;
                Ok(ExerciseSet {
                    id: parse_uuid(0, &id_str)?,
                    set_number: row.get(1)?,
                    set_type: parse_enum::<SetType>(2, &set_type_str)?,
                    metrics: metrics_from_columns(
                        tracking,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ),
                    is_completed: row.get(8)?,
                    completed_at: completed_str.map(|s| parse_timestamp(9, &s)).transpose()?,
                    is_personal_record: row.get(10)?,
                    created_at: parse_timestamp(11, &created_str)?,
                })
            })
            .map_err(Error::QueryFailed)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(Error::QueryFailed)?;
        entry.sets = sets;
        loaded.push(entry);
    }
    workout.exercises = loaded;
    Ok(())
}

pub fn get_workout(conn: &Connection, id: Uuid) -> Result<Option<Workout>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT id, kind, name, notes, started_at, ended_at, paused_duration_secs,
                    paused_at, status, created_at, updated_at
             FROM workouts WHERE id = ?1",
        )
        .map_err(Error::QueryFailed)?;
    let shell = stmt
        .query_row(params![id.to_string()], map_row_to_workout_shell)
        .optional()
        .map_err(Error::QueryFailed)?;

    match shell {
        Some(mut workout) => {
            load_children(conn, &mut workout)?;
            Ok(Some(workout))
        }
        None => Ok(None),
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct WorkoutFilters {
    pub status: Option<WorkoutStatus>,
    pub kind: Option<WorkoutType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<u32>,
}

/// Lists workouts matching the filters, most recent first, with their full
/// exercise/set graphs attached.
pub fn list_workouts(conn: &Connection, filters: &WorkoutFilters) -> Result<Vec<Workout>, Error> {
    let mut sql = "SELECT id, kind, name, notes, started_at, ended_at, paused_duration_secs,
                          paused_at, status, created_at, updated_at
                   FROM workouts WHERE 1=1"
        .to_string();
    let mut params_map: HashMap<String, Box<dyn ToSql>> = HashMap::new();

    if let Some(status) = filters.status {
        sql.push_str(" AND status = :status");
        params_map.insert(":status".into(), Box::new(status.to_string()));
    }
    if let Some(kind) = filters.kind {
        sql.push_str(" AND kind = :kind");
        params_map.insert(":kind".into(), Box::new(kind.to_string()));
    }
    if let Some(start) = filters.start_date {
        sql.push_str(" AND date(started_at) >= date(:start_date)");
        params_map.insert(
            ":start_date".into(),
            Box::new(start.format("%Y-%m-%d").to_string()),
        );
    }
    if let Some(end) = filters.end_date {
        sql.push_str(" AND date(started_at) <= date(:end_date)");
        params_map.insert(
            ":end_date".into(),
            Box::new(end.format("%Y-%m-%d").to_string()),
        );
    }
    sql.push_str(" ORDER BY started_at DESC");
    if let Some(limit) = filters.limit {
        sql.push_str(" LIMIT :limit");
        params_map.insert(":limit".into(), Box::new(limit));
    }

    let params_for_query: Vec<(&str, &dyn ToSql)> = params_map
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_ref()))
        .collect();

    let mut stmt = conn.prepare(&sql).map_err(Error::QueryFailed)?;
    let shells = stmt
        .query_map(params_for_query.as_slice(), map_row_to_workout_shell)
        .map_err(Error::QueryFailed)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)?;

    let mut workouts = Vec::with_capacity(shells.len());
    for mut workout in shells {
        load_children(conn, &mut workout)?;
        workouts.push(workout);
    }
    Ok(workouts)
}

/// Deletes a workout and cascades through its exercises and sets.
pub fn delete_workout(conn: &mut Connection, id: Uuid) -> Result<(), Error> {
    let tx = conn.transaction().map_err(Error::Connection)?;
    delete_children_tx(&tx, id).map_err(Error::DeleteFailed)?;
    let rows_affected = tx
        .execute("DELETE FROM workouts WHERE id = ?1", params![id.to_string()])
        .map_err(Error::DeleteFailed)?;
    tx.commit().map_err(Error::Connection)?;
    if rows_affected == 0 {
        Err(Error::WorkoutNotFound(id))
    } else {
        Ok(())
    }
}

/// The calendar day (UTC) of the most recent completed workout that ended
/// strictly before `cutoff`, ignoring `exclude_id`. Drives streak updates.
pub fn last_completed_day_before(
    conn: &Connection,
    exclude_id: Uuid,
    cutoff: DateTime<Utc>,
) -> Result<Option<NaiveDate>, Error> {
    let ended: Option<String> = conn
        .query_row(
            "SELECT ended_at FROM workouts
             WHERE status = 'completed' AND id != ?1 AND ended_at IS NOT NULL AND ended_at < ?2
             ORDER BY ended_at DESC LIMIT 1",
            params![exclude_id.to_string(), cutoff.to_rfc3339()],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::QueryFailed)?;

    match ended {
        Some(s) => {
            let ts = parse_timestamp(0, &s).map_err(Error::QueryFailed)?;
            Ok(Some(ts.date_naive()))
        }
        None => Ok(None),
    }
}

// --- Personal Record Functions ---

fn write_personal_record(conn: &Connection, record: &PersonalRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO personal_records (id, exercise_id, exercise_name, kind, value,
            previous_value, achieved_at, workout_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id.to_string(),
            record.exercise_id.to_string(),
            record.exercise_name,
            record.kind.to_string(),
            record.value,
            record.previous_value,
            record.achieved_at.to_rfc3339(),
            record.workout_id.map(|id| id.to_string()),
        ],
    )?;
    Ok(())
}

/// The best stored value for one record kind of one exercise. Fastest-time
/// records take the minimum, everything else the maximum.
pub fn best_record_value(
    conn: &Connection,
    exercise_id: Uuid,
    kind: RecordKind,
) -> Result<Option<f64>, Error> {
    let agg = if kind.prefers_lower() { "MIN" } else { "MAX" };
    let sql = format!(
        "SELECT {agg}(value) FROM personal_records WHERE exercise_id = ?1 AND kind = ?2"
    );
    conn.query_row(
        &sql,
        params![exercise_id.to_string(), kind.to_string()],
        |row| row.get(0),
    )
    .optional()
    .map_err(Error::QueryFailed)
    .map(|opt_opt: Option<Option<f64>>| opt_opt.flatten())
}

pub fn list_personal_records(
    conn: &Connection,
    exercise_id: Option<Uuid>,
    limit: Option<u32>,
) -> Result<Vec<PersonalRecord>, Error> {
    let mut sql = "SELECT id, exercise_id, exercise_name, kind, value, previous_value,
                          achieved_at, workout_id
                   FROM personal_records WHERE 1=1"
        .to_string();
    let mut params_map: HashMap<String, Box<dyn ToSql>> = HashMap::new();

    if let Some(id) = exercise_id {
        sql.push_str(" AND exercise_id = :exercise_id");
        params_map.insert(":exercise_id".into(), Box::new(id.to_string()));
    }
    sql.push_str(" ORDER BY achieved_at DESC");
    if let Some(limit) = limit {
        sql.push_str(" LIMIT :limit");
        params_map.insert(":limit".into(), Box::new(limit));
    }

    let params_for_query: Vec<(&str, &dyn ToSql)> = params_map
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_ref()))
        .collect();

    let mut stmt = conn.prepare(&sql).map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map(params_for_query.as_slice(), |row| {
            let id_str: String = row.get(0)?;
            let exercise_id_str: String = row.get(1)?;
            let kind_str: String = row.get(3)?;
            let achieved_str: String = row.get(6)?;
            let workout_id_str: Option<String> = row.get(7)?;
            Ok(PersonalRecord {
                id: parse_uuid(0, &id_str)?,
                exercise_id: parse_uuid(1, &exercise_id_str)?,
                exercise_name: row.get(2)?,
                kind: parse_enum::<RecordKind>(3, &kind_str)?,
                value: row.get(4)?,
                previous_value: row.get(5)?,
                achieved_at: parse_timestamp(6, &achieved_str)?,
                workout_id: workout_id_str.map(|s| parse_uuid(7, &s)).transpose()?,
            })
        })
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}
