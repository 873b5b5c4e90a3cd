// src/lib.rs
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};
use uuid::Uuid;

// --- Declare modules ---
pub mod billing;
mod config;
pub mod db;
pub mod health;
pub mod models;
pub mod stats;
pub mod timer;

// --- Expose public types ---
pub use billing::{StaticGate, SubscriptionGate, FREE_WORKOUT_TYPE_LIMIT};
pub use config::{
    get_config_path as get_config_path_util,
    load as load_config_util,
    save as save_config_util,
    Config,
    DistanceUnit,
    Error as ConfigError,
    WeightUnit,
    REST_PRESETS_SECS,
};
pub use db::{get_db_path as get_db_path_util, Error as StoreError, WorkoutFilters};
pub use health::{Authorization, DailyMetrics, HealthBridge, HealthBridgeError};
pub use models::{
    Equipment, Exercise, ExerciseCategory, ExerciseSet, ForgeUser, MuscleGroup, PersonalRecord,
    RecordKind, SetMetrics, SetType, TrackingType, Workout, WorkoutError, WorkoutExercise,
    WorkoutStatus, WorkoutType,
};
pub use stats::{
    chart_series, total_volume, workout_type_breakdown, ChartMetric, ChartPoint, Granularity,
    TypeBreakdown,
};
pub use timer::{RestTimer, SessionClock};

/// What the UI needs to know after a set is completed.
#[derive(Debug, Clone, PartialEq)]
pub struct SetCompletion {
    /// Rest countdown to auto-start, if the user has that enabled. Taken from
    /// the exercise's rest preference, falling back to the configured default.
    pub rest_secs: Option<u32>,
    /// Personal records this set just established.
    pub records: Vec<PersonalRecord>,
}

/// Summary of a finalized session.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSummary {
    pub duration_secs: u64,
    pub total_volume: f64,
    pub completed_sets: usize,
    pub current_streak: u32,
    pub synced_to_health: bool,
}

pub struct WorkoutService {
    pub config: Config,
    pub conn: Connection,
    pub health: Option<Box<dyn HealthBridge>>,
    pub billing: Box<dyn SubscriptionGate>,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl WorkoutService {
    /// Initializes the service with its collaborators.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or
    /// initialization fails.
    pub fn initialize(
        health: Option<Box<dyn HealthBridge>>,
        billing: Box<dyn SubscriptionGate>,
    ) -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load(&config_path)
            .context(format!("Failed to load config from {config_path:?}"))?;

        let db_path = db::get_db_path().context("Failed to determine database path")?;
        let conn = db::open_db(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;

        db::init_db(&conn).context("Failed to initialize database schema")?;

        Ok(Self {
            config,
            conn,
            health,
            billing,
            db_path,
            config_path,
        })
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save(&self.config_path, &self.config)
    }

    /// Sets the default rest countdown, the single source of truth for
    /// auto-started rest timers.
    /// # Errors
    /// - `ConfigError::InvalidRestDuration` if `secs` is 0.
    /// - `ConfigError` variants if saving fails.
    pub fn set_default_rest_secs(&mut self, secs: u32) -> Result<(), ConfigError> {
        if secs == 0 {
            return Err(ConfigError::InvalidRestDuration(secs));
        }
        self.config.default_rest_secs = secs;
        self.save_config()
    }

    /// Enables or disables the rest-timer auto-start on set completion.
    /// # Errors
    /// Returns `ConfigError` variants if saving fails.
    pub fn set_auto_start_rest_timer(&mut self, enabled: bool) -> Result<(), ConfigError> {
        self.config.auto_start_rest_timer = enabled;
        self.save_config()
    }

    // --- User ---

    /// Fetches the profile row, creating it on first use.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn current_user(&mut self) -> Result<ForgeUser> {
        if let Some(user) = db::get_user(&self.conn).context("Failed to fetch user profile")? {
            return Ok(user);
        }
        let user = ForgeUser::default();
        db::save_user(&self.conn, &user).context("Failed to create user profile")?;
        Ok(user)
    }

    /// The workout types this user may start. Free tier is capped; premium
    /// unlocks the full catalog.
    pub fn available_workout_types(&self) -> Vec<WorkoutType> {
        let all: Vec<WorkoutType> = WorkoutType::iter().collect();
        if self.billing.is_premium() {
            all
        } else {
            all.into_iter().take(FREE_WORKOUT_TYPE_LIMIT).collect()
        }
    }

    // --- Exercise catalog ---

    /// Creates a custom exercise definition.
    /// # Errors
    /// Returns `anyhow::Error` if the name is empty or the insert fails.
    pub fn create_exercise(
        &self,
        name: &str,
        primary_muscle: MuscleGroup,
        tracking_type: TrackingType,
    ) -> Result<Exercise> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            bail!("Exercise name cannot be empty.");
        }
        let exercise = Exercise::new(trimmed_name, primary_muscle, tracking_type);
        db::save_exercise(&self.conn, &exercise).map_err(|err| match err {
            StoreError::ExerciseNameNotUnique(_) => anyhow::anyhow!(err),
            _ => anyhow::Error::new(err)
                .context(format!("Failed to create exercise '{trimmed_name}'")),
        })?;
        Ok(exercise)
    }

    /// Lists catalog exercises, optionally filtered by muscle or name search.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn list_exercises(
        &self,
        muscle: Option<MuscleGroup>,
        search: Option<&str>,
    ) -> Result<Vec<Exercise>> {
        db::list_exercises(&self.conn, muscle, search)
            .context("Failed to list exercise definitions")
            .map_err(Into::into)
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_exercise(&self, id: Uuid) -> Result<Option<Exercise>> {
        db::get_exercise(&self.conn, id)
            .context("Failed to fetch exercise")
            .map_err(Into::into)
    }

    // --- Session mutations ---

    /// Starts a new session: in progress, empty, started now.
    /// # Errors
    /// Returns `anyhow::Error` if persisting the new workout fails.
    pub fn create_workout(&mut self, kind: WorkoutType) -> Result<Workout> {
        let workout = Workout::new(kind);
        db::save_workout(&mut self.conn, &workout).context("Failed to save new workout")?;
        info!(workout_id = %workout.id, kind = %kind, "workout started");
        Ok(workout)
    }

    /// Adds an exercise entry (with its initial empty set) to the workout and
    /// persists the graph. Returns the new entry's id.
    /// # Errors
    /// Returns `anyhow::Error` if persisting fails.
    pub fn add_exercise(&mut self, workout: &mut Workout, exercise: &Exercise) -> Result<Uuid> {
        let entry_id = workout.add_exercise(exercise, Utc::now()).id;
        db::save_workout(&mut self.conn, workout).context("Failed to save workout")?;
        debug!(workout_id = %workout.id, exercise = %exercise.name, "exercise added");
        Ok(entry_id)
    }

    /// Appends a set to an exercise entry, pre-filled from the last completed
    /// set for quick entry. Returns the new set's id.
    /// # Errors
    /// Returns `WorkoutError::ExerciseNotFound` or persistence errors.
    pub fn add_set(&mut self, workout: &mut Workout, exercise_id: Uuid) -> Result<Uuid> {
        let set_id = {
            let entry = workout.exercise_mut(exercise_id)?;
            entry.add_set_from_previous().id
        };
        workout.updated_at = Utc::now();
        db::save_workout(&mut self.conn, workout).context("Failed to save workout")?;
        Ok(set_id)
    }

    /// Replaces a set's measurements. Completion state is untouched. The
    /// metrics shape must match the exercise entry's tracking type.
    /// # Errors
    /// Returns `WorkoutError` variants or persistence errors.
    pub fn update_set(
        &mut self,
        workout: &mut Workout,
        exercise_id: Uuid,
        set_id: Uuid,
        metrics: SetMetrics,
    ) -> Result<()> {
        {
            let entry = workout.exercise_mut(exercise_id)?;
            if metrics.tracking_type() != entry.tracking_type {
                return Err(WorkoutError::MetricsMismatch {
                    expected: entry.tracking_type,
                    found: metrics.tracking_type(),
                }
                .into());
            }
            let set = entry.set_mut(set_id)?;
            set.metrics = metrics;
        }
        workout.updated_at = Utc::now();
        db::save_workout(&mut self.conn, workout).context("Failed to save workout")?;
        Ok(())
    }

    /// Marks a set completed now.
    /// # Errors
    /// Returns `WorkoutError` variants or persistence errors.
    pub fn complete_set(
        &mut self,
        workout: &mut Workout,
        exercise_id: Uuid,
        set_id: Uuid,
    ) -> Result<SetCompletion> {
        self.complete_set_at(workout, exercise_id, set_id, Utc::now())
    }

    /// Marks a set completed at an explicit timestamp, runs personal-record
    /// detection and reports the rest countdown to auto-start.
    /// # Errors
    /// Returns `WorkoutError` variants or persistence errors.
    pub fn complete_set_at(
        &mut self,
        workout: &mut Workout,
        exercise_id: Uuid,
        set_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<SetCompletion> {
        let (catalog_exercise_id, exercise_name, rest_pref, candidates) = {
            let entry = workout.exercise_mut(exercise_id)?;
            let catalog_id = entry.exercise_id;
            let name = entry.exercise_name.clone();
            let rest = entry.rest_between_sets_secs;
            let set = entry.set_mut(set_id)?;
            set.complete_at(at);
            (catalog_id, name, rest, set.metrics.record_candidates())
        };

        let mut records = Vec::new();
        for (kind, value) in candidates {
            let prior = db::best_record_value(&self.conn, catalog_exercise_id, kind)
                .context("Failed to look up prior best")?;
            if kind.beats(value, prior) {
                records.push(PersonalRecord {
                    id: Uuid::new_v4(),
                    exercise_id: catalog_exercise_id,
                    exercise_name: exercise_name.clone(),
                    kind,
                    value,
                    previous_value: prior,
                    achieved_at: at,
                    workout_id: Some(workout.id),
                });
            }
        }

        if !records.is_empty() {
            let entry = workout.exercise_mut(exercise_id)?;
            entry.set_mut(set_id)?.is_personal_record = true;
        }
        workout.updated_at = at;

        let user = if records.is_empty() {
            None
        } else {
            let mut user = self.current_user()?;
            user.personal_records += records.len() as u32;
            user.updated_at = at;
            Some(user)
        };
        db::save_set_completion(&mut self.conn, workout, &records, user.as_ref())
            .context("Failed to save set completion")?;

        for record in &records {
            info!(
                exercise = %record.exercise_name,
                kind = %record.kind,
                value = record.value,
                "personal record"
            );
        }

        let rest_secs = self
            .config
            .auto_start_rest_timer
            .then(|| rest_pref.unwrap_or(self.config.default_rest_secs));
        Ok(SetCompletion { rest_secs, records })
    }

    /// Reverts a set to uncompleted, clearing its timestamp and record flag.
    /// Record rows already written stay as history.
    /// # Errors
    /// Returns `WorkoutError` variants or persistence errors.
    pub fn uncomplete_set(
        &mut self,
        workout: &mut Workout,
        exercise_id: Uuid,
        set_id: Uuid,
    ) -> Result<()> {
        {
            let entry = workout.exercise_mut(exercise_id)?;
            entry.set_mut(set_id)?.uncomplete();
        }
        workout.updated_at = Utc::now();
        db::save_workout(&mut self.conn, workout).context("Failed to save workout")?;
        Ok(())
    }

    /// Deletes a set; survivors are renumbered densely from 1 and the whole
    /// graph is persisted in one transaction.
    /// # Errors
    /// Returns `WorkoutError` variants or persistence errors.
    pub fn delete_set(
        &mut self,
        workout: &mut Workout,
        exercise_id: Uuid,
        set_id: Uuid,
    ) -> Result<()> {
        workout.exercise_mut(exercise_id)?.delete_set(set_id)?;
        workout.updated_at = Utc::now();
        db::save_workout(&mut self.conn, workout).context("Failed to save workout")?;
        Ok(())
    }

    // --- Lifecycle ---

    /// # Errors
    /// `WorkoutError::InvalidTransition` unless in progress.
    pub fn pause_workout(&mut self, workout: &mut Workout) -> Result<()> {
        self.pause_workout_at(workout, Utc::now())
    }

    pub fn pause_workout_at(&mut self, workout: &mut Workout, at: DateTime<Utc>) -> Result<()> {
        workout.pause_at(at)?;
        db::save_workout(&mut self.conn, workout).context("Failed to save workout")?;
        debug!(workout_id = %workout.id, "workout paused");
        Ok(())
    }

    /// # Errors
    /// `WorkoutError::InvalidTransition` unless paused.
    pub fn resume_workout(&mut self, workout: &mut Workout) -> Result<()> {
        self.resume_workout_at(workout, Utc::now())
    }

    pub fn resume_workout_at(&mut self, workout: &mut Workout, at: DateTime<Utc>) -> Result<()> {
        workout.resume_at(at)?;
        db::save_workout(&mut self.conn, workout).context("Failed to save workout")?;
        debug!(workout_id = %workout.id, "workout resumed");
        Ok(())
    }

    /// Completes the session now.
    /// # Errors
    /// `WorkoutError::InvalidTransition` from a terminal state; persistence
    /// errors otherwise.
    pub fn complete_workout(&mut self, workout: &mut Workout) -> Result<CompletionSummary> {
        self.complete_workout_at(workout, Utc::now())
    }

    /// Completes the session at an explicit timestamp. Atomically (one
    /// transaction) finalizes the workout and applies the user stat deltas:
    /// workout count, cumulative duration and volume, and the streak. Health
    /// export is best-effort afterwards and never fails the completion.
    /// # Errors
    /// `WorkoutError::InvalidTransition` from a terminal state; persistence
    /// errors otherwise.
    pub fn complete_workout_at(
        &mut self,
        workout: &mut Workout,
        at: DateTime<Utc>,
    ) -> Result<CompletionSummary> {
        workout.complete_at(at)?;

        let duration_secs = workout.duration_secs_at(at);
        let volume = workout.total_volume();

        let mut user = self.current_user()?;
        let previous_day = db::last_completed_day_before(&self.conn, workout.id, at)
            .context("Failed to fetch last completed workout day")?;
        user.current_streak =
            streak_after_completion(previous_day, at.date_naive(), user.current_streak);
        user.longest_streak = user.longest_streak.max(user.current_streak);
        user.total_workouts += 1;
        user.total_duration_secs += duration_secs;
        user.total_volume += volume;
        user.updated_at = at;

        db::save_workout_and_user(&mut self.conn, workout, &user)
            .context("Failed to finalize workout")?;
        info!(
            workout_id = %workout.id,
            duration_secs,
            volume,
            streak = user.current_streak,
            "workout completed"
        );

        let synced_to_health = match self.try_health_export(workout) {
            Ok(synced) => synced,
            Err(e) => {
                warn!(workout_id = %workout.id, error = %e, "health export failed");
                false
            }
        };

        Ok(CompletionSummary {
            duration_secs,
            total_volume: volume,
            completed_sets: workout.completed_sets(),
            current_streak: user.current_streak,
            synced_to_health,
        })
    }

    fn try_health_export(&mut self, workout: &Workout) -> Result<bool, HealthBridgeError> {
        match self.health.as_mut() {
            Some(bridge) => {
                bridge.save_completed_workout(workout)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cancels the session now: the record stays but user stats are untouched.
    /// # Errors
    /// `WorkoutError::InvalidTransition` from a terminal state; persistence
    /// errors otherwise.
    pub fn cancel_workout(&mut self, workout: &mut Workout) -> Result<()> {
        self.cancel_workout_at(workout, Utc::now())
    }

    pub fn cancel_workout_at(&mut self, workout: &mut Workout, at: DateTime<Utc>) -> Result<()> {
        workout.cancel_at(at)?;
        db::save_workout(&mut self.conn, workout).context("Failed to save workout")?;
        info!(workout_id = %workout.id, "workout cancelled");
        Ok(())
    }

    /// Explicit user deletion: removes the workout and its whole graph.
    /// # Errors
    /// `StoreError::WorkoutNotFound` or other store errors.
    pub fn delete_workout(&mut self, id: Uuid) -> Result<()> {
        db::delete_workout(&mut self.conn, id).map_err(|err| match err {
            StoreError::WorkoutNotFound(_) => anyhow::anyhow!(err),
            _ => anyhow::Error::new(err).context(format!("Failed to delete workout {id}")),
        })
    }

    // --- Queries ---

    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_workout(&self, id: Uuid) -> Result<Option<Workout>> {
        db::get_workout(&self.conn, id)
            .context("Failed to fetch workout")
            .map_err(Into::into)
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn list_workouts(&self, filters: &WorkoutFilters) -> Result<Vec<Workout>> {
        db::list_workouts(&self.conn, filters)
            .context("Failed to list workouts")
            .map_err(Into::into)
    }

    /// Completed sessions, most recent first.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn completed_workouts(&self, limit: Option<u32>) -> Result<Vec<Workout>> {
        self.list_workouts(&WorkoutFilters {
            status: Some(WorkoutStatus::Completed),
            limit,
            ..Default::default()
        })
    }

    /// Chart series over completed workouts, anchored at `today`.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn chart_series(
        &self,
        granularity: Granularity,
        metric: ChartMetric,
        today: NaiveDate,
    ) -> Result<Vec<ChartPoint>> {
        let workouts = self.completed_workouts(None)?;
        Ok(stats::chart_series(&workouts, granularity, metric, today))
    }

    /// Top workout types by completed-session count.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn workout_type_breakdown(&self, top: usize) -> Result<Vec<TypeBreakdown>> {
        let workouts = self.completed_workouts(None)?;
        Ok(stats::workout_type_breakdown(&workouts, top))
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn personal_records(
        &self,
        exercise_id: Option<Uuid>,
        limit: Option<u32>,
    ) -> Result<Vec<PersonalRecord>> {
        db::list_personal_records(&self.conn, exercise_id, limit)
            .context("Failed to list personal records")
            .map_err(Into::into)
    }

    // --- Health bridge ---

    /// Exports a workout to the health bridge. The completion precondition is
    /// checked here, before the bridge is touched.
    /// # Errors
    /// - `HealthBridgeError::WorkoutNotComplete` for an unfinished workout.
    /// - `HealthBridgeError::Bridge` when no bridge is configured or it fails.
    pub fn sync_workout_to_health(&mut self, workout: &Workout) -> Result<(), HealthBridgeError> {
        if !workout.is_complete() {
            return Err(HealthBridgeError::WorkoutNotComplete);
        }
        let bridge = self
            .health
            .as_mut()
            .ok_or_else(|| HealthBridgeError::Bridge("no health bridge configured".into()))?;
        bridge.save_completed_workout(workout)
    }

    /// # Errors
    /// `HealthBridgeError::Bridge` when no bridge is configured or it fails.
    pub fn daily_metrics(&self, date: NaiveDate) -> Result<DailyMetrics, HealthBridgeError> {
        let bridge = self
            .health
            .as_ref()
            .ok_or_else(|| HealthBridgeError::Bridge("no health bridge configured".into()))?;
        bridge.fetch_daily_metrics(date)
    }
}

// --- Helper Functions ---

/// The streak value after completing a workout on `day`, given the calendar
/// day of the most recent prior completed workout. Another workout on the
/// same day leaves the streak alone; exactly the next day extends it; any
/// larger gap restarts at 1.
fn streak_after_completion(previous_day: Option<NaiveDate>, day: NaiveDate, current: u32) -> u32 {
    match previous_day {
        None => 1,
        Some(prev) if prev == day => current.max(1),
        Some(prev) if prev.succ_opt() == Some(day) => current + 1,
        Some(_) => 1,
    }
}
