//! Task coordination engine
//!
//! Turns disaster reports into typed tasks, pairs pending tasks with
//! available agents and reconciles completion reports against each
//! disaster's lifecycle. All state lives in one struct mutated through
//! `&mut self`, so callers that share it behind a mutex get every
//! assignment and completion as a single atomic step.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::disaster::DisasterEvent;
use crate::error::ParseResult;
use crate::priority::PriorityPolicy;
use crate::task::{CompletionReport, Task, TaskStatus, TaskType};
use crate::types::{AclMessage, Content, Performative};

/// Configuration for the coordination engine
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub policy: PriorityPolicy,
    /// ACTIVE tasks older than this are abandoned. `None` waits forever.
    pub active_task_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.active_task_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }
}

/// Result of submitting a disaster report
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// The id was seen before; nothing changed.
    Duplicate,
    Accepted {
        priority: f64,
        task_ids: Vec<String>,
        /// True when no task was required and the disaster closed at once.
        closed: bool,
    },
}

/// One task handed to one agent, with the request that announces it
#[derive(Debug, Clone)]
pub struct Assignment {
    pub task_id: String,
    pub task_type: TaskType,
    pub agent: String,
    pub request: AclMessage,
}

/// Result of processing a completion report
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Completed {
        task_id: String,
        /// Set when this completion closed the task's disaster.
        closed_disaster: Option<String>,
    },
    Ignored(String),
}

struct DisasterRecord {
    event: DisasterEvent,
    completed: HashSet<TaskType>,
}

/// Snapshot of engine counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    pub active_disasters: usize,
    pub closed_disasters: u64,
    pub pending_tasks: usize,
    pub active_tasks: usize,
    pub completed_tasks: usize,
    pub abandoned_tasks: usize,
    pub people_rescued: u64,
    pub supplies_delivered: u64,
    pub available_rescue: usize,
    pub available_logistics: usize,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Disasters:{} (closed {}) | Tasks pending:{} active:{} completed:{} abandoned:{}",
            self.active_disasters,
            self.closed_disasters,
            self.pending_tasks,
            self.active_tasks,
            self.completed_tasks,
            self.abandoned_tasks
        )?;
        write!(
            f,
            " | Rescued:{} | Supplies:{} | Available rescue:{} logistics:{}",
            self.people_rescued,
            self.supplies_delivered,
            self.available_rescue,
            self.available_logistics
        )
    }
}

pub struct CoordinationEngine {
    config: EngineConfig,
    disasters: HashMap<String, DisasterRecord>,
    seen: HashSet<String>,
    priorities: HashMap<String, f64>,
    tasks: HashMap<String, Task>,
    pending: VecDeque<String>,
    active_since: HashMap<String, Instant>,
    pools: HashMap<TaskType, VecDeque<String>>,
    /// agent name -> task id currently assigned
    assigned: HashMap<String, String>,
    roles: HashMap<String, TaskType>,
    people_rescued: u64,
    supplies_delivered: u64,
    closed_disasters: u64,
}

impl CoordinationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            disasters: HashMap::new(),
            seen: HashSet::new(),
            priorities: HashMap::new(),
            tasks: HashMap::new(),
            pending: VecDeque::new(),
            active_since: HashMap::new(),
            pools: HashMap::new(),
            assigned: HashMap::new(),
            roles: HashMap::new(),
            people_rescued: 0,
            supplies_delivered: 0,
            closed_disasters: 0,
        }
    }

    /// Add an agent to the availability pool for `task_type`.
    ///
    /// Returns false when the agent is already available or currently holds
    /// an assignment; the pools are left untouched in that case.
    pub fn register_agent(&mut self, name: &str, task_type: TaskType) -> bool {
        if self.assigned.contains_key(name) {
            return false;
        }
        if self.pools.values().any(|pool| pool.iter().any(|a| a == name)) {
            return false;
        }
        self.roles.insert(name.to_string(), task_type);
        self.pools
            .entry(task_type)
            .or_default()
            .push_back(name.to_string());
        debug!("Agent {} available for {} tasks", name, task_type);
        true
    }

    pub fn assess_content(&mut self, content: &Content) -> ParseResult<Assessment> {
        let event = DisasterEvent::from_content(content)?;
        Ok(self.assess(event))
    }

    /// Store a new disaster, score it and queue the tasks it requires
    pub fn assess(&mut self, event: DisasterEvent) -> Assessment {
        if !self.seen.insert(event.id.clone()) {
            debug!("Ignoring duplicate disaster {}", event.id);
            return Assessment::Duplicate;
        }

        let priority = self.config.policy.score(&event);
        self.priorities.insert(event.id.clone(), priority);
        info!(
            "ASSESSING: {} | Type:{} | Severity:{} | Priority:{:.1}",
            event.id, event.category, event.severity, priority
        );

        let mut task_ids = Vec::new();
        if event.requires_rescue {
            task_ids.push(self.enqueue(Task::rescue(&event)));
        }
        if event.requires_supplies {
            task_ids.push(self.enqueue(Task::supply(&event)));
        }

        let closed = task_ids.is_empty();
        if closed {
            info!("DISASTER CLOSED: {} required no tasks", event.id);
            self.closed_disasters += 1;
        } else {
            self.disasters.insert(
                event.id.clone(),
                DisasterRecord {
                    event,
                    completed: HashSet::new(),
                },
            );
        }

        Assessment::Accepted {
            priority,
            task_ids,
            closed,
        }
    }

    fn enqueue(&mut self, task: Task) -> String {
        let id = task.id.clone();
        info!(
            "TASK CREATED: {} {} for {}",
            task.task_type(),
            id,
            task.disaster_id
        );
        self.pending.push_back(id.clone());
        self.tasks.insert(id.clone(), task);
        id
    }

    /// Pair the oldest pending task that has a free agent of its type with
    /// the longest-waiting agent of that pool.
    pub fn assign_next(&mut self) -> Option<Assignment> {
        let idx = self.pending.iter().position(|id| {
            self.tasks
                .get(id)
                .map(|t| self.pools.get(&t.task_type()).is_some_and(|p| !p.is_empty()))
                .unwrap_or(false)
        })?;
        let task_id = self.pending.remove(idx)?;
        let task = self.tasks.get_mut(&task_id)?;
        let task_type = task.task_type();
        let agent = self.pools.get_mut(&task_type)?.pop_front()?;

        task.status = TaskStatus::Active;
        task.assigned_to = Some(agent.clone());
        self.active_since.insert(task_id.clone(), Instant::now());
        self.assigned.insert(agent.clone(), task_id.clone());

        let request = AclMessage::new(
            Performative::Request,
            vec![agent.clone()],
            task.assignment_content(),
        )
        .with_ontology(task_type.assignment_ontology());

        info!("ASSIGNED: {} task {} to {}", task_type, task_id, agent);
        Some(Assignment {
            task_id,
            task_type,
            agent,
            request,
        })
    }

    pub fn assign_all(&mut self) -> Vec<Assignment> {
        std::iter::from_fn(|| self.assign_next()).collect()
    }

    pub fn complete_content(&mut self, agent: &str, content: &Content) -> ParseResult<Completion> {
        let report = CompletionReport::from_content(content)?;
        Ok(self.complete(agent, &report))
    }

    /// Reconcile a completion report from `agent`.
    ///
    /// Reports for unknown or inactive tasks, from an agent other than the
    /// assignee, or with a mismatched task type change nothing.
    pub fn complete(&mut self, agent: &str, report: &CompletionReport) -> Completion {
        let Some(task) = self.tasks.get_mut(&report.task_id) else {
            return ignored(format!("unknown task {}", report.task_id));
        };
        if task.status != TaskStatus::Active {
            return ignored(format!("task {} is {}", task.id, task.status));
        }
        if task.assigned_to.as_deref() != Some(agent) {
            return ignored(format!("task {} is not assigned to {}", task.id, agent));
        }
        if task.task_type() != report.task_type {
            return ignored(format!(
                "task {} is a {} task, report says {}",
                task.id,
                task.task_type(),
                report.task_type
            ));
        }

        task.status = TaskStatus::Completed;
        let task_type = task.task_type();
        let disaster_id = task.disaster_id.clone();
        let task_id = task.id.clone();

        self.active_since.remove(&task_id);
        self.assigned.remove(agent);
        self.pools
            .entry(task_type)
            .or_default()
            .push_back(agent.to_string());

        match task_type {
            TaskType::Rescue => {
                self.people_rescued += u64::from(report.people_rescued);
                info!(
                    "RESCUE COMPLETE: {} | Rescued: {} | Total rescued: {}",
                    task_id, report.people_rescued, self.people_rescued
                );
            }
            TaskType::Supply => {
                self.supplies_delivered += report.total_supplies();
                info!(
                    "SUPPLY COMPLETE: {} | Delivered: {} | Total delivered: {}",
                    task_id,
                    report.total_supplies(),
                    self.supplies_delivered
                );
            }
        }

        let closed_disaster = self.record_completion(&disaster_id, task_type);
        Completion::Completed {
            task_id,
            closed_disaster,
        }
    }

    fn record_completion(&mut self, disaster_id: &str, task_type: TaskType) -> Option<String> {
        let record = self.disasters.get_mut(disaster_id)?;
        record.completed.insert(task_type);
        if record.completed.len() < record.event.expected_task_count() {
            return None;
        }
        self.disasters.remove(disaster_id);
        self.closed_disasters += 1;
        info!(
            "DISASTER RESPONSE COMPLETE: {} | Total rescued: {}",
            disaster_id, self.people_rescued
        );
        Some(disaster_id.to_string())
    }

    /// Move an ACTIVE task to the abandoned set.
    ///
    /// With `release_agent` the assignee goes back to its pool; otherwise it
    /// stays out of rotation until it registers again.
    pub fn abandon(&mut self, task_id: &str, release_agent: bool) -> bool {
        let Some(task) = self.tasks.get_mut(task_id) else {
            return false;
        };
        if task.status != TaskStatus::Active {
            return false;
        }
        task.status = TaskStatus::Abandoned;
        self.active_since.remove(task_id);

        if let Some(agent) = task.assigned_to.clone() {
            self.assigned.remove(&agent);
            if release_agent {
                self.pools
                    .entry(task.task_type())
                    .or_default()
                    .push_back(agent.clone());
            }
            let fate = if release_agent { "released" } else { "held" };
            warn!("TASK ABANDONED: {} (agent {} {})", task_id, agent, fate);
        }
        true
    }

    /// Abandon the task currently held by `agent`, if any
    pub fn abandon_held_by(&mut self, agent: &str, release_agent: bool) -> Option<String> {
        let task_id = self.assigned.get(agent)?.clone();
        self.abandon(&task_id, release_agent).then_some(task_id)
    }

    /// Abandon ACTIVE tasks older than the configured timeout
    pub fn expire_stale(&mut self, now: Instant) -> Vec<String> {
        let Some(timeout) = self.config.active_task_timeout else {
            return Vec::new();
        };
        let mut stale: Vec<String> = self
            .active_since
            .iter()
            .filter(|(_, since)| now.saturating_duration_since(**since) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        stale.sort();
        stale.retain(|id| self.abandon(id, false));
        stale
    }

    pub fn priority(&self, disaster_id: &str) -> Option<f64> {
        self.priorities.get(disaster_id).copied()
    }

    /// Active disasters ordered by descending priority
    pub fn ranked_disasters(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .disasters
            .keys()
            .filter_map(|id| self.priority(id).map(|p| (id.clone(), p)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    pub fn is_active_disaster(&self, disaster_id: &str) -> bool {
        self.disasters.contains_key(disaster_id)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn pending_task_ids(&self) -> Vec<String> {
        self.pending.iter().cloned().collect()
    }

    pub fn available(&self, task_type: TaskType) -> usize {
        self.pools.get(&task_type).map_or(0, VecDeque::len)
    }

    pub fn is_available(&self, agent: &str) -> bool {
        self.roles
            .get(agent)
            .and_then(|t| self.pools.get(t))
            .is_some_and(|pool| pool.iter().any(|a| a == agent))
    }

    pub fn assignment_of(&self, agent: &str) -> Option<&str> {
        self.assigned.get(agent).map(String::as_str)
    }

    fn count_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            active_disasters: self.disasters.len(),
            closed_disasters: self.closed_disasters,
            pending_tasks: self.pending.len(),
            active_tasks: self.active_since.len(),
            completed_tasks: self.count_status(TaskStatus::Completed),
            abandoned_tasks: self.count_status(TaskStatus::Abandoned),
            people_rescued: self.people_rescued,
            supplies_delivered: self.supplies_delivered,
            available_rescue: self.available(TaskType::Rescue),
            available_logistics: self.available(TaskType::Supply),
        }
    }
}

fn ignored(reason: String) -> Completion {
    debug!("Ignoring completion: {}", reason);
    Completion::Ignored(reason)
}
