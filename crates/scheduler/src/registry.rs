//! Insertion-ordered job collection.
//!
//! Insertion order is the only dispatch priority: among queued jobs of the
//! same mode, the one added first is dispatched first. Removal uses
//! `shift_remove` so the relative order of the remaining jobs never changes.

use atelier_core::job::{Job, JobPatch};
use atelier_core::mode::Mode;
use atelier_core::status::{JobStatus, StatusClass};
use atelier_core::types::JobId;
use indexmap::IndexMap;
use serde::Serialize;

/// Per-class job totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn terminal(&self) -> usize {
        self.completed + self.failed
    }

    pub fn total(&self) -> usize {
        self.queued + self.active + self.terminal()
    }

    /// Nothing waiting and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.active == 0
    }
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: IndexMap<JobId, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    /// Merge `status` and `patch` into the job; `None` if the id is unknown.
    pub fn update(&mut self, id: &JobId, status: JobStatus, patch: JobPatch) -> Option<&Job> {
        let job = self.jobs.get_mut(id)?;
        job.apply(status, patch);
        Some(job)
    }

    pub fn remove(&mut self, id: &JobId) -> Option<Job> {
        self.jobs.shift_remove(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// All jobs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Jobs matching `predicate`, in insertion order.
    pub fn query<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a Job> + 'a
    where
        P: Fn(&Job) -> bool + 'a,
    {
        self.jobs.values().filter(move |job| predicate(*job))
    }

    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Job) -> bool,
    {
        self.jobs.values().filter(|job| predicate(*job)).count()
    }

    /// Number of jobs of `mode` currently in an active status.
    pub fn active_count(&self, mode: Mode) -> usize {
        self.count(|job| job.mode == mode && job.status.is_active())
    }

    /// Ids of the first `limit` queued jobs of `mode`, oldest first.
    pub fn next_queued(&self, mode: Mode, limit: usize) -> Vec<JobId> {
        self.query(move |job| job.mode == mode && job.status.is_queued())
            .take(limit)
            .map(|job| job.id)
            .collect()
    }

    /// Distinct modes that have queued jobs, ordered by their oldest
    /// queued job.
    pub fn queued_modes(&self) -> Vec<Mode> {
        let mut modes = Vec::new();
        for job in self.query(|job| job.status.is_queued()) {
            if !modes.contains(&job.mode) {
                modes.push(job.mode);
            }
        }
        modes
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for job in self.jobs.values() {
            match job.status.class() {
                StatusClass::Queued => counts.queued += 1,
                StatusClass::Active => counts.active += 1,
                StatusClass::Terminal if job.status == JobStatus::Failed => counts.failed += 1,
                StatusClass::Terminal => counts.completed += 1,
            }
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use atelier_core::job::{AssetRef, JobSubmission};

    use super::*;

    fn job(mode: Mode) -> Job {
        Job::from_submission(JobSubmission::new(mode).with_asset(AssetRef::new("in.png"))).unwrap()
    }

    fn registry_with(modes: &[Mode]) -> (JobRegistry, Vec<JobId>) {
        let mut registry = JobRegistry::new();
        let ids = modes
            .iter()
            .map(|&mode| {
                let job = job(mode);
                let id = job.id;
                registry.insert(job);
                id
            })
            .collect();
        (registry, ids)
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let (registry, ids) = registry_with(&[Mode::Upscale, Mode::RemoveBg, Mode::Upscale]);
        let seen: Vec<_> = registry.iter().map(|j| j.id).collect();
        assert_eq!(seen, ids);
    }

    #[test]
    fn remove_keeps_relative_order() {
        let (mut registry, ids) = registry_with(&[Mode::Upscale, Mode::Upscale, Mode::Upscale]);
        assert!(registry.remove(&ids[1]).is_some());
        let seen: Vec<_> = registry.iter().map(|j| j.id).collect();
        assert_eq!(seen, vec![ids[0], ids[2]]);
        assert!(registry.remove(&ids[1]).is_none());
    }

    #[test]
    fn update_merges_patch() {
        let (mut registry, ids) = registry_with(&[Mode::RemoveBg]);
        registry.update(&ids[0], JobStatus::Matting, JobPatch::new().progress(10));
        let job = registry
            .update(&ids[0], JobStatus::Refining, JobPatch::new().message("edges"))
            .unwrap();
        assert_eq!(job.progress, Some(10));
        assert_eq!(job.progress_message.as_deref(), Some("edges"));
    }

    #[test]
    fn update_unknown_id_returns_none() {
        let mut registry = JobRegistry::new();
        assert!(registry
            .update(&uuid_like(), JobStatus::Completed, JobPatch::new())
            .is_none());
    }

    fn uuid_like() -> JobId {
        atelier_core::types::new_job_id()
    }

    #[test]
    fn next_queued_is_fifo_per_mode() {
        let (mut registry, ids) =
            registry_with(&[Mode::Upscale, Mode::RemoveBg, Mode::Upscale, Mode::Upscale]);
        registry.update(&ids[0], JobStatus::Refining, JobPatch::new());
        assert_eq!(registry.next_queued(Mode::Upscale, 5), vec![ids[2], ids[3]]);
        assert_eq!(registry.next_queued(Mode::Upscale, 1), vec![ids[2]]);
        assert_eq!(registry.active_count(Mode::Upscale), 1);
        assert_eq!(registry.active_count(Mode::RemoveBg), 0);
    }

    #[test]
    fn queued_modes_ordered_by_oldest_job() {
        let (registry, _) =
            registry_with(&[Mode::VideoAd, Mode::RemoveBg, Mode::VideoAd, Mode::Localize]);
        assert_eq!(
            registry.queued_modes(),
            vec![Mode::VideoAd, Mode::RemoveBg, Mode::Localize]
        );
    }

    #[test]
    fn counts_by_class() {
        let (mut registry, ids) = registry_with(&[Mode::Upscale; 4]);
        registry.update(&ids[0], JobStatus::Refining, JobPatch::new());
        registry.update(&ids[1], JobStatus::Completed, JobPatch::new());
        registry.update(&ids[2], JobStatus::Failed, JobPatch::new().error("boom"));
        let counts = registry.counts();
        assert_eq!(
            counts,
            StatusCounts {
                queued: 1,
                active: 1,
                completed: 1,
                failed: 1,
            }
        );
        assert_eq!(counts.total(), 4);
        assert!(!counts.is_idle());
    }
}
