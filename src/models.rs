//src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by mutations on the workout aggregate.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WorkoutError {
    #[error("Invalid workout transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkoutStatus,
        to: WorkoutStatus,
    },
    #[error("Exercise entry not found in workout: {0}")]
    ExerciseNotFound(Uuid),
    #[error("Set not found: {0}")]
    SetNotFound(Uuid),
    #[error("Set metrics shaped for {found} cannot be stored on a {expected} exercise")]
    MetricsMismatch {
        expected: TrackingType,
        found: TrackingType,
    },
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum WorkoutStatus {
    InProgress,
    Paused,
    Completed,
    Cancelled,
}

impl WorkoutStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Tag describing the kind of session (used for breakdown charts and gating).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum WorkoutType {
    Gym,
    Weightlifting,
    Crossfit,
    Bodyweight,
    Running,
    Walking,
    Cycling,
    Swimming,
    Rowing,
    Elliptical,
    StairClimber,
    Hiit,
    CircuitTraining,
    Boxing,
    Kickboxing,
    MartialArts,
    Climbing,
    Bouldering,
    Yoga,
    Pilates,
    Stretching,
    Tennis,
    Basketball,
    Soccer,
    Golf,
    Baseball,
    Volleyball,
    Hiking,
    Dance,
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum MuscleGroup {
    Chest,
    Shoulders,
    Triceps,
    Back,
    Biceps,
    Forearms,
    Abs,
    Obliques,
    LowerBack,
    Quads,
    Hamstrings,
    Glutes,
    Calves,
    HipFlexors,
    FullBody,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Equipment {
    None,
    Bodyweight,
    Barbell,
    Dumbbell,
    Kettlebell,
    Cable,
    Machine,
    ResistanceBand,
    PullUpBar,
    Bench,
    Treadmill,
    Bike,
    RowingMachine,
    JumpRope,
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum ExerciseCategory {
    Compound,
    Isolation,
    Cardio,
    Flexibility,
    Plyometric,
    Calisthenics,
}

/// The shape of data an exercise records per set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum TrackingType {
    WeightAndReps,
    RepsOnly,
    TimeOnly,
    DistanceAndTime,
    DistanceOnly,
    CaloriesOnly,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum SetType {
    Warmup,
    Working,
    DropSet,
    FailureSet,
    RestPause,
    SuperSet,
}

/// Reference entity: an exercise definition ("Bench Press"). Never mutated by
/// a session; `WorkoutExercise` denormalizes what it needs for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: Uuid,
    pub name: String,
    pub primary_muscle: MuscleGroup,
    pub secondary_muscles: Vec<MuscleGroup>,
    pub equipment: Option<Equipment>,
    pub category: Option<ExerciseCategory>,
    pub tracking_type: TrackingType,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl Exercise {
    pub fn new(name: &str, primary_muscle: MuscleGroup, tracking_type: TrackingType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            primary_muscle,
            secondary_muscles: Vec::new(),
            equipment: None,
            category: None,
            tracking_type,
            is_system: false,
            created_at: Utc::now(),
        }
    }
}

/// Per-set measurements, shaped by the exercise's tracking type so that a
/// timed set can never carry reps and a weighted set can never carry meters.
/// Fields stay optional within a variant: values arrive incrementally while
/// the athlete fills the row in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SetMetrics {
    WeightReps {
        weight: Option<f64>,
        reps: Option<u32>,
    },
    Reps {
        reps: Option<u32>,
    },
    Duration {
        secs: Option<u32>,
    },
    DistanceTime {
        meters: Option<f64>,
        secs: Option<u32>,
    },
    Distance {
        meters: Option<f64>,
    },
    Calories {
        kcal: Option<u32>,
    },
}

impl SetMetrics {
    pub const fn blank(tracking: TrackingType) -> Self {
        match tracking {
            TrackingType::WeightAndReps => Self::WeightReps {
                weight: None,
                reps: None,
            },
            TrackingType::RepsOnly => Self::Reps { reps: None },
            TrackingType::TimeOnly => Self::Duration { secs: None },
            TrackingType::DistanceAndTime => Self::DistanceTime {
                meters: None,
                secs: None,
            },
            TrackingType::DistanceOnly => Self::Distance { meters: None },
            TrackingType::CaloriesOnly => Self::Calories { kcal: None },
        }
    }

    pub const fn tracking_type(&self) -> TrackingType {
        match self {
            Self::WeightReps { .. } => TrackingType::WeightAndReps,
            Self::Reps { .. } => TrackingType::RepsOnly,
            Self::Duration { .. } => TrackingType::TimeOnly,
            Self::DistanceTime { .. } => TrackingType::DistanceAndTime,
            Self::Distance { .. } => TrackingType::DistanceOnly,
            Self::Calories { .. } => TrackingType::CaloriesOnly,
        }
    }

    /// weight x reps when both are present; 0 for every other shape.
    pub fn volume(&self) -> f64 {
        match self {
            Self::WeightReps {
                weight: Some(w),
                reps: Some(r),
            } => w * f64::from(*r),
            _ => 0.0,
        }
    }

    /// The record categories this set competes in, with the candidate value.
    pub fn record_candidates(&self) -> Vec<(RecordKind, f64)> {
        let mut candidates = Vec::new();
        match *self {
            Self::WeightReps { weight, reps } => {
                if let Some(w) = weight.filter(|&w| w > 0.0) {
                    candidates.push((RecordKind::MaxWeight, w));
                }
                if let Some(r) = reps.filter(|&r| r > 0) {
                    candidates.push((RecordKind::MaxReps, f64::from(r)));
                }
                let volume = self.volume();
                if volume > 0.0 {
                    candidates.push((RecordKind::MaxVolume, volume));
                }
            }
            Self::Reps { reps } => {
                if let Some(r) = reps.filter(|&r| r > 0) {
                    candidates.push((RecordKind::MaxReps, f64::from(r)));
                }
            }
            Self::Duration { secs } => {
                if let Some(s) = secs.filter(|&s| s > 0) {
                    candidates.push((RecordKind::LongestTime, f64::from(s)));
                }
            }
            Self::DistanceTime { meters, secs } => {
                if let Some(m) = meters.filter(|&m| m > 0.0) {
                    candidates.push((RecordKind::LongestDistance, m));
                }
                if let Some(s) = secs.filter(|&s| s > 0) {
                    candidates.push((RecordKind::FastestTime, f64::from(s)));
                }
            }
            Self::Distance { meters } => {
                if let Some(m) = meters.filter(|&m| m > 0.0) {
                    candidates.push((RecordKind::LongestDistance, m));
                }
            }
            // Calorie totals are not tracked as records.
            Self::Calories { .. } => {}
        }
        candidates
    }
}

/// One discrete unit of an exercise (e.g. 10 reps at 135 lbs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub id: Uuid,
    pub set_number: u32,
    pub set_type: SetType,
    pub metrics: SetMetrics,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_personal_record: bool,
    pub created_at: DateTime<Utc>,
}

impl ExerciseSet {
    pub fn new(set_number: u32, metrics: SetMetrics) -> Self {
        Self {
            id: Uuid::new_v4(),
            set_number,
            set_type: SetType::Working,
            metrics,
            is_completed: false,
            completed_at: None,
            is_personal_record: false,
            created_at: Utc::now(),
        }
    }

    /// Volume counts only once the set is completed.
    pub fn volume(&self) -> f64 {
        if self.is_completed {
            self.metrics.volume()
        } else {
            0.0
        }
    }

    pub fn complete_at(&mut self, at: DateTime<Utc>) {
        self.is_completed = true;
        self.completed_at = Some(at);
    }

    pub fn uncomplete(&mut self) {
        self.is_completed = false;
        self.completed_at = None;
        self.is_personal_record = false;
    }
}

/// An exercise instance within a workout. Name, muscle and tracking type are
/// copied from the `Exercise` at creation so history keeps rendering even if
/// the catalog entry is later edited or removed. Holds only the parent's id,
/// not a back-reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutExercise {
    pub id: Uuid,
    pub exercise_id: Uuid,
    pub exercise_name: String,
    pub primary_muscle: MuscleGroup,
    pub tracking_type: TrackingType,
    pub order: u32,
    pub notes: Option<String>,
    pub rest_between_sets_secs: Option<u32>,
    pub sets: Vec<ExerciseSet>,
    pub created_at: DateTime<Utc>,
}

impl WorkoutExercise {
    pub fn new(exercise: &Exercise, order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            exercise_id: exercise.id,
            exercise_name: exercise.name.clone(),
            primary_muscle: exercise.primary_muscle,
            tracking_type: exercise.tracking_type,
            order,
            notes: None,
            rest_between_sets_secs: None,
            sets: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Appends a blank set numbered `len + 1`.
    pub fn add_set(&mut self) -> &mut ExerciseSet {
        let metrics = SetMetrics::blank(self.tracking_type);
        self.push_set(metrics)
    }

    /// Appends a set pre-filled from the most recent completed set, for quick
    /// entry. Falls back to a blank set when nothing is completed yet.
    pub fn add_set_from_previous(&mut self) -> &mut ExerciseSet {
        let metrics = self
            .sets
            .iter()
            .rev()
            .find(|s| s.is_completed)
            .map_or_else(|| SetMetrics::blank(self.tracking_type), |s| s.metrics);
        self.push_set(metrics)
    }

    fn push_set(&mut self, metrics: SetMetrics) -> &mut ExerciseSet {
        let number = self.sets.len() as u32 + 1;
        self.sets.push(ExerciseSet::new(number, metrics));
        self.sets.last_mut().expect("just pushed")
    }

    /// Removes a set and renumbers the survivors densely from 1, preserving
    /// relative order.
    pub fn delete_set(&mut self, set_id: Uuid) -> Result<(), WorkoutError> {
        let before = self.sets.len();
        self.sets.retain(|s| s.id != set_id);
        if self.sets.len() == before {
            return Err(WorkoutError::SetNotFound(set_id));
        }
        for (index, set) in self.sets.iter_mut().enumerate() {
            set.set_number = index as u32 + 1;
        }
        Ok(())
    }

    pub fn set_mut(&mut self, set_id: Uuid) -> Result<&mut ExerciseSet, WorkoutError> {
        self.sets
            .iter_mut()
            .find(|s| s.id == set_id)
            .ok_or(WorkoutError::SetNotFound(set_id))
    }

    pub fn total_volume(&self) -> f64 {
        self.sets.iter().map(ExerciseSet::volume).sum()
    }

    pub fn completed_sets(&self) -> usize {
        self.sets.iter().filter(|s| s.is_completed).count()
    }

    /// The completed set with the highest volume; ties go to the earliest
    /// completion.
    pub fn best_set(&self) -> Option<&ExerciseSet> {
        self.sets
            .iter()
            .filter(|s| s.is_completed)
            .fold(None, |best: Option<&ExerciseSet>, candidate| match best {
                None => Some(candidate),
                Some(current) => {
                    if candidate.volume() > current.volume()
                        || (candidate.volume() == current.volume()
                            && candidate.completed_at < current.completed_at)
                    {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            })
    }

    pub fn is_complete(&self) -> bool {
        !self.sets.is_empty() && self.sets.iter().all(|s| s.is_completed)
    }
}

/// The session aggregate root. Exclusively owns its exercises, which
/// exclusively own their sets; deleting the workout drops the whole graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub id: Uuid,
    pub kind: WorkoutType,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub paused_duration_secs: u32,
    /// Start of the pause currently in progress, if any.
    pub paused_at: Option<DateTime<Utc>>,
    pub status: WorkoutStatus,
    pub exercises: Vec<WorkoutExercise>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workout {
    pub fn new(kind: WorkoutType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            name: None,
            notes: None,
            started_at: now,
            ended_at: None,
            paused_duration_secs: 0,
            paused_at: None,
            status: WorkoutStatus::InProgress,
            exercises: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Elapsed seconds between start and end (or `now` while running), with
    /// paused time excluded. Never negative.
    pub fn duration_secs_at(&self, now: DateTime<Utc>) -> u64 {
        let end = self.ended_at.unwrap_or(now);
        let gross = (end - self.started_at).num_seconds();
        (gross - i64::from(self.paused_duration_secs)).max(0) as u64
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs_at(Utc::now())
    }

    pub fn total_volume(&self) -> f64 {
        self.exercises.iter().map(WorkoutExercise::total_volume).sum()
    }

    pub fn total_sets(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }

    pub fn completed_sets(&self) -> usize {
        self.exercises.iter().map(WorkoutExercise::completed_sets).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.status == WorkoutStatus::Completed
    }

    /// Appends an exercise entry with the next order index and its initial
    /// blank set, mirroring the common case of starting the exercise
    /// immediately.
    pub fn add_exercise(&mut self, exercise: &Exercise, at: DateTime<Utc>) -> &mut WorkoutExercise {
        let order = self.exercises.len() as u32;
        let mut entry = WorkoutExercise::new(exercise, order);
        entry.add_set();
        self.exercises.push(entry);
        self.updated_at = at;
        self.exercises.last_mut().expect("just pushed")
    }

    pub fn exercise_mut(&mut self, id: Uuid) -> Result<&mut WorkoutExercise, WorkoutError> {
        self.exercises
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(WorkoutError::ExerciseNotFound(id))
    }

    fn ensure_active(&self, to: WorkoutStatus) -> Result<(), WorkoutError> {
        if self.status.is_terminal() {
            return Err(WorkoutError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    pub fn pause_at(&mut self, at: DateTime<Utc>) -> Result<(), WorkoutError> {
        if self.status != WorkoutStatus::InProgress {
            return Err(WorkoutError::InvalidTransition {
                from: self.status,
                to: WorkoutStatus::Paused,
            });
        }
        self.status = WorkoutStatus::Paused;
        self.paused_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn resume_at(&mut self, at: DateTime<Utc>) -> Result<(), WorkoutError> {
        if self.status != WorkoutStatus::Paused {
            return Err(WorkoutError::InvalidTransition {
                from: self.status,
                to: WorkoutStatus::InProgress,
            });
        }
        self.fold_pause(at);
        self.status = WorkoutStatus::InProgress;
        self.updated_at = at;
        Ok(())
    }

    pub fn complete_at(&mut self, at: DateTime<Utc>) -> Result<(), WorkoutError> {
        self.ensure_active(WorkoutStatus::Completed)?;
        self.fold_pause(at);
        self.status = WorkoutStatus::Completed;
        self.ended_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Keeps the record but marks it non-countable for stats.
    pub fn cancel_at(&mut self, at: DateTime<Utc>) -> Result<(), WorkoutError> {
        self.ensure_active(WorkoutStatus::Cancelled)?;
        self.fold_pause(at);
        self.status = WorkoutStatus::Cancelled;
        self.ended_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Accumulates an open pause span into `paused_duration_secs`.
    fn fold_pause(&mut self, at: DateTime<Utc>) {
        if let Some(paused_at) = self.paused_at.take() {
            let span = (at - paused_at).num_seconds().max(0);
            self.paused_duration_secs += span as u32;
        }
    }
}

/// Aggregate stats holder, touched exactly once per completed workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeUser {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub total_workouts: u32,
    pub total_duration_secs: u64,
    pub total_volume: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub personal_records: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ForgeUser {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            display_name: None,
            total_workouts: 0,
            total_duration_secs: 0,
            total_volume: 0.0,
            current_streak: 0,
            longest_streak: 0,
            personal_records: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    MaxWeight,
    MaxReps,
    MaxVolume,
    FastestTime,
    LongestTime,
    LongestDistance,
}

impl RecordKind {
    /// Fastest-time records improve downward; everything else upward.
    pub const fn prefers_lower(self) -> bool {
        matches!(self, Self::FastestTime)
    }

    pub fn beats(self, value: f64, prior: Option<f64>) -> bool {
        match prior {
            None => true,
            Some(best) if self.prefers_lower() => value < best,
            Some(best) => value > best,
        }
    }
}

/// The best-ever value of one metric for one exercise. Rows are never edited;
/// a better value creates a fresh row carrying the superseded one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalRecord {
    pub id: Uuid,
    pub exercise_id: Uuid,
    pub exercise_name: String,
    pub kind: RecordKind,
    pub value: f64,
    pub previous_value: Option<f64>,
    pub achieved_at: DateTime<Utc>,
    pub workout_id: Option<Uuid>,
}

impl PersonalRecord {
    pub fn improvement(&self) -> Option<f64> {
        self.previous_value.map(|prev| self.value - prev)
    }
}
