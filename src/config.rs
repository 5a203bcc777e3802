use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::gates::{CompletionJudgeConfig, PlanValidatorConfig, TierMinimums};
use crate::orchestration::{
    DispatcherConfig, ExecutorConfig, HandoffConfig, RetryPolicy, SessionBudget,
};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub plan: PlanSection,
    #[serde(default)]
    pub completion: CompletionSection,
    #[serde(default)]
    pub handoff: HandoffSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub max_parallel: usize,
    pub operation_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            operation_timeout_secs: 30,
            batch_timeout_secs: 300,
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub max_iterations: u32,
    pub max_wall_clock_secs: u64,
    /// 0 disables the stall check.
    pub max_stalled_cycles: u32,
    pub max_plan_revisions: u32,
    pub max_judge_rejections: u32,
    pub max_batch_tasks: usize,
    pub max_locators_per_task: usize,
    pub max_task_attempts: u32,
    pub early_completion_check: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_wall_clock_secs: 30 * 60,
            max_stalled_cycles: 3,
            max_plan_revisions: 3,
            max_judge_rejections: 5,
            max_batch_tasks: 4,
            max_locators_per_task: 3,
            max_task_attempts: 3,
            early_completion_check: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSection {
    pub simple_min_tasks: usize,
    pub simple_min_dimensions: usize,
    pub moderate_min_tasks: usize,
    pub moderate_min_dimensions: usize,
    pub complex_min_tasks: usize,
    pub complex_min_dimensions: usize,
    pub semantic_review: bool,
}

impl Default for PlanSection {
    fn default() -> Self {
        Self {
            simple_min_tasks: 1,
            simple_min_dimensions: 1,
            moderate_min_tasks: 3,
            moderate_min_dimensions: 2,
            complex_min_tasks: 5,
            complex_min_dimensions: 3,
            semantic_review: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSection {
    pub min_p1_completion: f64,
    pub min_evidence_per_task: usize,
    pub min_sources: usize,
    pub semantic_review: bool,
}

impl Default for CompletionSection {
    fn default() -> Self {
        Self {
            min_p1_completion: 0.8,
            min_evidence_per_task: 2,
            min_sources: 2,
            semantic_review: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSection {
    pub max_excerpt_chars: usize,
}

impl Default for HandoffSection {
    fn default() -> Self {
        Self {
            max_excerpt_chars: 500,
        }
    }
}

impl Config {
    pub fn delve_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".delve"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::delve_dir()?.join("delve.toml"))
    }

    /// Load `~/.delve/delve.toml`, or defaults if it does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading config");
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            max_parallel = config.dispatch.max_parallel,
            max_iterations = config.session.max_iterations,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                debug!(dir = %dir.display(), "Creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let dispatch = &self.dispatch;
        DispatcherConfig {
            max_parallel: dispatch.max_parallel.max(1),
            operation_timeout: Duration::from_secs(dispatch.operation_timeout_secs),
            batch_timeout: Duration::from_secs(dispatch.batch_timeout_secs),
            retry: RetryPolicy {
                max_attempts: dispatch.max_attempts.max(1),
                initial_backoff: Duration::from_millis(dispatch.initial_backoff_ms),
                max_backoff: Duration::from_millis(dispatch.max_backoff_ms),
            },
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        let session = &self.session;
        ExecutorConfig {
            budget: SessionBudget {
                max_iterations: session.max_iterations,
                max_wall_clock: Duration::from_secs(session.max_wall_clock_secs),
                max_stalled_cycles: session.max_stalled_cycles,
            },
            max_plan_revisions: session.max_plan_revisions,
            max_judge_rejections: session.max_judge_rejections,
            max_batch_tasks: session.max_batch_tasks.max(1),
            max_locators_per_task: session.max_locators_per_task,
            max_task_attempts: session.max_task_attempts.max(1),
            early_completion_check: session.early_completion_check,
        }
    }

    pub fn plan_validator_config(&self) -> PlanValidatorConfig {
        let plan = &self.plan;
        PlanValidatorConfig {
            simple: TierMinimums {
                tasks: plan.simple_min_tasks,
                dimensions: plan.simple_min_dimensions,
            },
            moderate: TierMinimums {
                tasks: plan.moderate_min_tasks,
                dimensions: plan.moderate_min_dimensions,
            },
            complex: TierMinimums {
                tasks: plan.complex_min_tasks,
                dimensions: plan.complex_min_dimensions,
            },
            semantic_review: plan.semantic_review,
        }
    }

    pub fn completion_judge_config(&self) -> CompletionJudgeConfig {
        let completion = &self.completion;
        CompletionJudgeConfig {
            min_p1_completion: completion.min_p1_completion.clamp(0.0, 1.0),
            min_evidence_per_task: completion.min_evidence_per_task,
            min_sources: completion.min_sources,
            semantic_review: completion.semantic_review,
        }
    }

    pub fn handoff_config(&self) -> HandoffConfig {
        HandoffConfig {
            max_excerpt_chars: self.handoff.max_excerpt_chars,
            min_sources: self.completion.min_sources,
        }
    }
}
