//! The job table (spec.md §3/§4.J): tracks every background or
//! stopped pipeline by process-group id, its per-stage pids and exit
//! statuses, and the `+`/`-` current/previous job markers `fg`/`bg`/`jobs`
//! rely on.
//!
//! Grounded on the teacher's `jobs::JobTable` (same `HashMap<id, Job>` plus
//! `next_id` shape), generalized from single-`Child`-per-job to a pgid with
//! a list of member pids (a pipeline's stages), and reaped via
//! `job_control::try_wait_pid` instead of `Child::try_wait` so it works for
//! stages that were never owned by this process as a `std::process::Child`.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
    Terminated,
}

/// One tracked job: a pipeline's process group, still running or finished.
pub struct Job {
    pub id: u32,
    pub pgid: i32,
    pub pids: Vec<i32>,
    pub command: String,
    pub state: JobState,
    pub background: bool,
    /// Exit status per pipeline stage, filled in as each pid is reaped;
    /// `None` until that stage finishes.
    pub pipeline_statuses: Vec<Option<i32>>,
    /// Set once `jobs`/shell-exit notification has printed this job's
    /// final Done/Terminated line, so it's only reported once.
    pub notified: bool,
    /// If stopped by `SIGTSTP` while in the foreground, the executor should
    /// `SIGCONT` it and move it to the background rather than leave it
    /// stopped (spec.md §4.X point 7). Set for foreground jobs started by
    /// an interactive shell.
    pub auto_background_on_stop: bool,
}

impl Job {
    /// The status to report as `$?` for this job: the last stage's, if
    /// known (spec.md's pipefail-independent last-stage-unless-pipefail
    /// default lives in `executor.rs`; this just exposes the raw value).
    pub fn last_known_status(&self) -> Option<i32> {
        self.pipeline_statuses.last().copied().flatten()
    }
}

/// The shell's job table — tracks all background and stopped jobs.
pub struct JobTable {
    jobs: BTreeMap<u32, Job>,
    next_id: u32,
    current_job: Option<u32>,
    previous_job: Option<u32>,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        JobTable {
            jobs: BTreeMap::new(),
            next_id: 1,
            current_job: None,
            previous_job: None,
        }
    }

    /// Register a new job and mark it `current` (spec.md §4.J's `+`/`-`
    /// bookkeeping: the old current becomes previous).
    pub fn add(&mut self, pgid: i32, pids: Vec<i32>, command: String, background: bool, state: JobState) -> u32 {
        self.add_with_auto_background(pgid, pids, command, background, state, false)
    }

    /// Like `add`, but also sets `auto_background_on_stop` — used for
    /// foreground jobs an interactive shell should auto-continue in the
    /// background if `SIGTSTP` stops them (spec.md §4.X point 7).
    #[allow(clippy::too_many_arguments)]
    pub fn add_with_auto_background(
        &mut self,
        pgid: i32,
        pids: Vec<i32>,
        command: String,
        background: bool,
        state: JobState,
        auto_background_on_stop: bool,
    ) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let stage_count = pids.len();
        self.jobs.insert(
            id,
            Job {
                id,
                pgid,
                pids,
                command,
                state,
                background,
                pipeline_statuses: vec![None; stage_count],
                notified: false,
                auto_background_on_stop,
            },
        );
        self.promote_to_current(id);
        id
    }

    fn promote_to_current(&mut self, id: u32) {
        if self.current_job != Some(id) {
            self.previous_job = self.current_job;
            self.current_job = Some(id);
        }
    }

    pub fn get(&self, id: u32) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Job> {
        let removed = self.jobs.remove(&id);
        if self.current_job == Some(id) {
            self.current_job = self.previous_job.take();
            self.previous_job = self.jobs.keys().next_back().copied().filter(|&j| Some(j) != self.current_job);
        } else if self.previous_job == Some(id) {
            self.previous_job = None;
        }
        removed
    }

    pub fn mark_stopped(&mut self, id: u32) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.state = JobState::Stopped;
        }
        self.promote_to_current(id);
    }

    pub fn mark_running(&mut self, id: u32) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.state = JobState::Running;
        }
        self.promote_to_current(id);
    }

    /// All jobs in ascending job-id order — the order `jobs`/notification
    /// must use (spec.md §9 Open Question #3, resolved in SPEC_FULL.md).
    pub fn jobs_ascending(&self) -> Vec<&Job> {
        self.jobs.values().collect()
    }

    pub fn current_job(&self) -> Option<u32> {
        self.current_job
    }

    pub fn previous_job(&self) -> Option<u32> {
        self.previous_job
    }

    /// Marker shown by `jobs`: `+` for current, `-` for previous, ' ' else.
    pub fn marker_for(&self, id: u32) -> char {
        if self.current_job == Some(id) {
            '+'
        } else if self.previous_job == Some(id) {
            '-'
        } else {
            ' '
        }
    }

    pub fn job_id_for_pgid(&self, pgid: i32) -> Option<u32> {
        self.jobs.values().find(|j| j.pgid == pgid).map(|j| j.id)
    }

    /// Non-blocking poll of every running/stopped job's member pids.
    /// Returns the ids of jobs whose state changed to `Done`/`Terminated`
    /// this call, in ascending order, for the caller to notify about.
    #[cfg(unix)]
    pub fn update_statuses(&mut self) -> Vec<u32> {
        let mut newly_finished = Vec::new();

        for job in self.jobs.values_mut() {
            if matches!(job.state, JobState::Done | JobState::Terminated) {
                continue;
            }
            let mut all_finished = true;
            for (idx, pid) in job.pids.iter().enumerate() {
                if job.pipeline_statuses[idx].is_some() {
                    continue;
                }
                match crate::job_control::try_wait_pid(*pid) {
                    Ok(Some(crate::job_control::WaitOutcome::Exited(code))) => {
                        job.pipeline_statuses[idx] = Some(code);
                    }
                    Ok(Some(crate::job_control::WaitOutcome::Stopped)) => {
                        job.state = JobState::Stopped;
                        all_finished = false;
                    }
                    Ok(Some(crate::job_control::WaitOutcome::Continued)) => {
                        job.state = JobState::Running;
                        all_finished = false;
                    }
                    Ok(None) => all_finished = false,
                    Err(_) => all_finished = false,
                }
            }
            if all_finished && job.state != JobState::Stopped {
                let all_exited = job.pipeline_statuses.iter().all(Option::is_some);
                if all_exited {
                    job.state = JobState::Done;
                    newly_finished.push(job.id);
                }
            }
        }

        newly_finished.sort_unstable();
        newly_finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_jobs_assigns_ascending_ids() {
        let mut table = JobTable::new();
        let a = table.add(100, vec![100], "sleep 1".into(), true, JobState::Running);
        let b = table.add(200, vec![200], "sleep 2".into(), true, JobState::Running);
        assert!(b > a);
        assert_eq!(table.jobs_ascending().iter().map(|j| j.id).collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn current_and_previous_track_most_recent_two() {
        let mut table = JobTable::new();
        let a = table.add(1, vec![1], "a".into(), true, JobState::Running);
        let b = table.add(2, vec![2], "b".into(), true, JobState::Running);
        assert_eq!(table.current_job(), Some(b));
        assert_eq!(table.previous_job(), Some(a));
        assert_eq!(table.marker_for(b), '+');
        assert_eq!(table.marker_for(a), '-');
    }

    #[test]
    fn removing_current_promotes_previous() {
        let mut table = JobTable::new();
        let a = table.add(1, vec![1], "a".into(), true, JobState::Running);
        let b = table.add(2, vec![2], "b".into(), true, JobState::Running);
        table.remove(b);
        assert_eq!(table.current_job(), Some(a));
    }

    #[test]
    fn stopping_a_job_promotes_it_to_current() {
        let mut table = JobTable::new();
        let a = table.add(1, vec![1], "a".into(), true, JobState::Running);
        let b = table.add(2, vec![2], "b".into(), true, JobState::Running);
        table.mark_stopped(a);
        assert_eq!(table.current_job(), Some(a));
        assert_eq!(table.previous_job(), Some(b));
    }
}
