// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Concurrent sub-agent team scheduling.
//!
//! This crate is deliberately decoupled from `sven-core`: it knows nothing
//! about `Agent` or the model/tool stack, only about a generic [`TeamWorker`]
//! that can run one teammate's task and report progress. The concrete Agent
//! wiring (spawning a real sub-agent per teammate, relaying its events) lives
//! in `sven-bootstrap`, which already depends on both `sven-core` and this
//! crate — keeping the dependency edge one-directional.
//!
//! Grounded on the same round-robin-and-collect shape used by the teacher's
//! `ToolRegistry::execute` fan-out in the turn loop (spawn everything, await
//! in order), generalized here to run independently and report results as
//! soon as each teammate finishes rather than waiting on the slowest.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use uuid::Uuid;

/// A single unit of work handed to one teammate.
#[derive(Debug, Clone)]
pub struct TeamMemberTask {
    /// Stable id for this teammate within the team, used to tag relayed
    /// progress events.
    pub member_id: String,
    /// The task description given to this teammate.
    pub task: String,
}

/// Outcome of one teammate's run.
#[derive(Debug, Clone)]
pub struct TeamMemberResult {
    pub member_id: String,
    pub output: String,
    pub is_error: bool,
}

/// Runs a single teammate's task to completion. Implemented by the concrete
/// sub-agent wiring in `sven-bootstrap`; kept generic here so this crate has
/// no dependency on the agent/model stack.
#[async_trait]
pub trait TeamWorker: Send + Sync {
    async fn run(&self, task: TeamMemberTask) -> TeamMemberResult;
}

/// Runs `tasks` concurrently across `teammates.len()` sub-agents, one task
/// per worker, and collects results as they complete — a worker that
/// finishes (or errors) does not block or cancel its siblings.
///
/// `worker` is cloned (as an `Arc`) into every spawned future. Implementors
/// that need per-teammate identity (e.g. a distinct system prompt) should
/// bake that into the task's `member_id`/`task` fields rather than into the
/// worker, since all teammates share one `Arc<dyn TeamWorker>`.
pub struct TeamScheduler;

impl TeamScheduler {
    /// Run every task in `tasks` against `worker` concurrently and return
    /// results in completion order (not submission order).
    pub async fn run(
        worker: Arc<dyn TeamWorker>,
        tasks: Vec<TeamMemberTask>,
    ) -> Vec<TeamMemberResult> {
        let mut futs = FuturesUnordered::new();
        for task in tasks {
            let worker = Arc::clone(&worker);
            futs.push(async move { worker.run(task).await });
        }

        let mut results = Vec::new();
        while let Some(result) = futs.next().await {
            results.push(result);
        }
        results
    }

    /// Launch up to `teammates.len()` workers concurrently, distributing
    /// `tasks` across them **round-robin** (task `i` goes to
    /// `teammates[i % teammates.len()]`). Each teammate runs its assigned
    /// tasks sequentially; teammates themselves run concurrently. A failing
    /// task does not stop its teammate from picking up its next task, and a
    /// teammate that errors out does not cancel its siblings.
    ///
    /// Results are returned in completion order, tagged with the originating
    /// teammate id via [`TeamMemberTask::member_id`].
    pub async fn run_round_robin(
        worker: Arc<dyn TeamWorker>,
        teammates: Vec<String>,
        tasks: Vec<String>,
    ) -> Vec<TeamMemberResult> {
        if teammates.is_empty() {
            return Vec::new();
        }

        let mut buckets: Vec<Vec<String>> = vec![Vec::new(); teammates.len()];
        for (i, task) in tasks.into_iter().enumerate() {
            buckets[i % teammates.len()].push(task);
        }

        let mut futs = FuturesUnordered::new();
        for (member_id, assigned) in teammates.into_iter().zip(buckets.into_iter()) {
            let worker = Arc::clone(&worker);
            futs.push(async move {
                let mut results = Vec::with_capacity(assigned.len());
                for task in assigned {
                    results.push(
                        worker
                            .run(TeamMemberTask {
                                member_id: member_id.clone(),
                                task,
                            })
                            .await,
                    );
                }
                results
            });
        }

        let mut results = Vec::new();
        while let Some(batch) = futs.next().await {
            results.extend(batch);
        }
        results
    }
}

/// Generates a short, stable id for a team run (`team-xxxxxxxx`) or a
/// teammate within it (`member-xxxxxxxx`).
pub fn short_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple().to_string().get(..8).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct DelayedEchoWorker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TeamWorker for DelayedEchoWorker {
        async fn run(&self, task: TeamMemberTask) -> TeamMemberResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Reverse-order delay: the last task submitted finishes first,
            // proving results are collected in completion order.
            let delay_ms = 30 - (task.task.len() as u64 % 3) * 10;
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            TeamMemberResult {
                member_id: task.member_id,
                output: format!("done: {}", task.task),
                is_error: false,
            }
        }
    }

    #[tokio::test]
    async fn runs_all_tasks_and_collects_every_result() {
        let worker = Arc::new(DelayedEchoWorker {
            calls: AtomicUsize::new(0),
        });
        let tasks = vec![
            TeamMemberTask {
                member_id: "a".into(),
                task: "one".into(),
            },
            TeamMemberTask {
                member_id: "b".into(),
                task: "two".into(),
            },
            TeamMemberTask {
                member_id: "c".into(),
                task: "three".into(),
            },
        ];

        let results = TeamScheduler::run(worker.clone(), tasks).await;
        assert_eq!(results.len(), 3);
        assert_eq!(worker.calls.load(Ordering::SeqCst), 3);
        let mut member_ids: Vec<&str> = results.iter().map(|r| r.member_id.as_str()).collect();
        member_ids.sort();
        assert_eq!(member_ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn one_erroring_worker_does_not_cancel_siblings() {
        struct MaybeFailWorker;
        #[async_trait]
        impl TeamWorker for MaybeFailWorker {
            async fn run(&self, task: TeamMemberTask) -> TeamMemberResult {
                if task.member_id == "fails" {
                    TeamMemberResult {
                        member_id: task.member_id,
                        output: "boom".into(),
                        is_error: true,
                    }
                } else {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    TeamMemberResult {
                        member_id: task.member_id,
                        output: "ok".into(),
                        is_error: false,
                    }
                }
            }
        }

        let worker = Arc::new(MaybeFailWorker);
        let tasks = vec![
            TeamMemberTask {
                member_id: "fails".into(),
                task: "x".into(),
            },
            TeamMemberTask {
                member_id: "survives".into(),
                task: "y".into(),
            },
        ];

        let results = TeamScheduler::run(worker, tasks).await;
        assert_eq!(results.len(), 2);
        let survivor = results.iter().find(|r| r.member_id == "survives").unwrap();
        assert!(!survivor.is_error);
        let failed = results.iter().find(|r| r.member_id == "fails").unwrap();
        assert!(failed.is_error);
    }

    #[test]
    fn short_id_has_expected_shape() {
        let id = short_id("team");
        assert!(id.starts_with("team-"));
        assert_eq!(id.len(), "team-".len() + 8);
    }
}
