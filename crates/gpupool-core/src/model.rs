//! Organization, GPU resource, job, and cost-interval records
//!
//! These are the store-resident records the engine operates on. Status fields
//! are closed enums; the legal job transitions live on [`JobStatus`] so every
//! caller checks the same state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant boundary; every resource and job belongs to exactly one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable name
    pub name: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Organization {
    /// Create a new organization
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
        }
    }
}

/// GPU resource status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuStatus {
    /// No running job references this resource
    Available,
    /// Exactly one running job references this resource
    Busy,
    /// Withdrawn from scheduling by the operator or telemetry
    Offline,
}

impl std::fmt::Display for GpuStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuStatus::Available => write!(f, "available"),
            GpuStatus::Busy => write!(f, "busy"),
            GpuStatus::Offline => write!(f, "offline"),
        }
    }
}

/// A schedulable unit of GPU capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuResource {
    /// Unique identifier
    pub id: Uuid,
    /// Owning organization
    pub organization_id: Uuid,
    /// Hardware type (e.g. "a100-80gb")
    pub gpu_type: String,
    /// Total memory in MiB
    pub memory_total_mb: u64,
    /// Memory held by the current reservation in MiB
    pub memory_allocated_mb: u64,
    /// Current status
    pub status: GpuStatus,
    /// Whether this is a spot resource subject to reclamation
    pub is_spot: bool,
    /// Price snapshotted into cost intervals at allocation time
    pub cost_per_hour: f64,
    /// When a spot resource will be reclaimed, if known
    pub termination_time: Option<DateTime<Utc>>,
    /// Last telemetry heartbeat
    pub last_active: Option<DateTime<Utc>>,
    /// The running job holding this resource, if any
    pub active_job_id: Option<Uuid>,
}

impl GpuResource {
    /// Create a new available resource with no memory allocated
    pub fn new(
        organization_id: Uuid,
        gpu_type: String,
        memory_total_mb: u64,
        cost_per_hour: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            gpu_type,
            memory_total_mb,
            memory_allocated_mb: 0,
            status: GpuStatus::Available,
            is_spot: false,
            cost_per_hour,
            termination_time: None,
            last_active: None,
            active_job_id: None,
        }
    }

    /// Memory not held by a reservation, in MiB
    pub fn spare_memory_mb(&self) -> u64 {
        self.memory_total_mb.saturating_sub(self.memory_allocated_mb)
    }

    /// Whether new work may land on this resource at `now`.
    ///
    /// Spot resources past their termination time are excluded from placement
    /// even while still listed as available; running jobs are never evicted.
    pub fn is_schedulable(&self, now: DateTime<Utc>) -> bool {
        if self.status != GpuStatus::Available {
            return false;
        }
        match self.termination_time {
            Some(t) if self.is_spot => now < t,
            _ => true,
        }
    }
}

/// Job status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a resource
    Queued,
    /// Holding a resource, executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an execution fault
    Failed,
    /// Withdrawn before or during execution
    Cancelled,
}

impl JobStatus {
    /// Whether this status ends the lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Legal transitions:
    /// `queued -> running`, `queued -> cancelled`,
    /// `running -> completed | failed | cancelled`. Nothing else.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (*self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// A unit of work requesting GPU capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier
    pub id: Uuid,
    /// Owning organization
    pub organization_id: Uuid,
    /// Work descriptor (model reference or command handle)
    pub model: String,
    /// Memory the job needs, in MiB
    pub memory_required_mb: u64,
    /// Required hardware type, if the job cares
    pub gpu_type: Option<String>,
    /// Higher schedules first; age breaks ties
    pub priority: i32,
    /// Current status
    pub status: JobStatus,
    /// Resource held while running; retained on terminal states that ran
    pub gpu_id: Option<Uuid>,
    /// Submission timestamp
    pub created_at: DateTime<Utc>,
    /// Set on `queued -> running`
    pub started_at: Option<DateTime<Utc>>,
    /// Set on any terminal transition
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when the job fails
    pub error_message: Option<String>,
}

impl Job {
    /// Create a new queued job
    pub fn new(organization_id: Uuid, model: String, memory_required_mb: u64, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            model,
            memory_required_mb,
            gpu_type: None,
            priority,
            status: JobStatus::Queued,
            gpu_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// The billed time span and price during which a job held a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostInterval {
    /// Unique identifier
    pub id: Uuid,
    /// Owning organization
    pub organization_id: Uuid,
    /// Resource the job held
    pub gpu_id: Uuid,
    /// Job this interval bills; at most one interval per job
    pub job_id: Uuid,
    /// When the allocation opened
    pub start_time: DateTime<Utc>,
    /// When the allocation closed; `None` while the job is running
    pub end_time: Option<DateTime<Utc>>,
    /// Price snapshot taken at allocation time
    pub cost_per_hour: f64,
    /// Set exactly once at close, never recomputed
    pub total_cost: Option<f64>,
}

impl CostInterval {
    /// Open a new interval at `start_time`
    pub fn open(
        organization_id: Uuid,
        gpu_id: Uuid,
        job_id: Uuid,
        cost_per_hour: f64,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            gpu_id,
            job_id,
            start_time,
            end_time: None,
            cost_per_hour,
            total_cost: None,
        }
    }

    /// Whether the interval is still accruing cost
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_gpu_resource_new() {
        let org = Uuid::new_v4();
        let gpu = GpuResource::new(org, "a100-80gb".to_string(), 81920, 3.0);
        assert_eq!(gpu.organization_id, org);
        assert_eq!(gpu.status, GpuStatus::Available);
        assert_eq!(gpu.spare_memory_mb(), 81920);
        assert!(gpu.active_job_id.is_none());
    }

    #[test]
    fn test_spare_memory_saturates() {
        let mut gpu = GpuResource::new(Uuid::new_v4(), "t4".to_string(), 16384, 0.5);
        gpu.memory_allocated_mb = 20000;
        assert_eq!(gpu.spare_memory_mb(), 0);
    }

    #[test]
    fn test_spot_past_termination_not_schedulable() {
        let now = Utc::now();
        let mut gpu = GpuResource::new(Uuid::new_v4(), "t4".to_string(), 16384, 0.5);
        gpu.is_spot = true;
        gpu.termination_time = Some(now - Duration::minutes(5));
        assert!(!gpu.is_schedulable(now));

        gpu.termination_time = Some(now + Duration::hours(1));
        assert!(gpu.is_schedulable(now));
    }

    #[test]
    fn test_busy_not_schedulable() {
        let mut gpu = GpuResource::new(Uuid::new_v4(), "t4".to_string(), 16384, 0.5);
        gpu.status = GpuStatus::Busy;
        assert!(!gpu.is_schedulable(Utc::now()));
    }

    #[test]
    fn test_job_new_is_queued() {
        let job = Job::new(Uuid::new_v4(), "phi-2".to_string(), 16000, 0);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.gpu_id.is_none());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_job_status_round_trip() {
        for s in ["queued", "running", "completed", "failed", "cancelled"] {
            let parsed: JobStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_cost_interval_open() {
        let interval = CostInterval::open(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 2.0, Utc::now());
        assert!(interval.is_open());
        assert!(interval.total_cost.is_none());
    }
}
