use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::application::ports::Analyzer;
use crate::domain::{FilterPolicy, StageName};

pub struct StageRegistration {
    pub name: StageName,
    pub description: String,
    pub depends_on: Vec<StageName>,
    pub analyzer: Arc<dyn Analyzer>,
}

impl StageRegistration {
    pub fn new(name: StageName, description: impl Into<String>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            name,
            description: description.into(),
            depends_on: Vec::new(),
            analyzer,
        }
    }

    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = StageName>) -> Self {
        self.depends_on.extend(dependencies);
        self
    }
}

pub struct RegisteredStage {
    pub name: StageName,
    pub description: String,
    pub depends_on: Vec<StageName>,
    pub analyzer: Arc<dyn Analyzer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub filter: Option<StageName>,
    pub stages: Vec<StageName>,
}

pub struct AnalyzerRegistry {
    stages: HashMap<StageName, RegisteredStage>,
    filter_stage: Option<StageName>,
}

#[derive(Default)]
pub struct AnalyzerRegistryBuilder {
    registrations: Vec<StageRegistration>,
    filter_stage: Option<StageName>,
}

impl AnalyzerRegistryBuilder {
    pub fn register(mut self, registration: StageRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    pub fn filter_stage(mut self, name: StageName) -> Self {
        self.filter_stage = Some(name);
        self
    }

    pub fn build(self) -> Result<AnalyzerRegistry, RegistryError> {
        let mut stages: HashMap<StageName, RegisteredStage> = HashMap::new();

        for registration in self.registrations {
            if stages.contains_key(&registration.name) {
                return Err(RegistryError::DuplicateStage(registration.name));
            }
            stages.insert(
                registration.name.clone(),
                RegisteredStage {
                    name: registration.name,
                    description: registration.description,
                    depends_on: registration.depends_on,
                    analyzer: registration.analyzer,
                },
            );
        }

        let cycle_node = {
            let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
            for stage in stages.values() {
                graph.add_node(stage.name.as_str());
                for dependency in &stage.depends_on {
                    if !stages.contains_key(dependency) {
                        return Err(RegistryError::UnknownDependency {
                            stage: stage.name.clone(),
                            dependency: dependency.clone(),
                        });
                    }
                    graph.add_edge(dependency.as_str(), stage.name.as_str(), ());
                }
            }
            toposort(&graph, None)
                .err()
                .map(|cycle| cycle.node_id().to_string())
        };

        if let Some(node) = cycle_node {
            let stage = StageName::new(node.clone())
                .map_err(|_| RegistryError::UnknownStage(node))?;
            return Err(RegistryError::DependencyCycle(stage));
        }

        if let Some(filter) = &self.filter_stage {
            let stage = stages
                .get(filter)
                .ok_or_else(|| RegistryError::UnknownStage(filter.to_string()))?;
            if !stage.depends_on.is_empty() {
                return Err(RegistryError::FilterStageHasDependencies(filter.clone()));
            }
        }

        tracing::info!(
            stage_count = stages.len(),
            filter_stage = ?self.filter_stage.as_ref().map(StageName::as_str),
            "Analyzer registry built"
        );

        Ok(AnalyzerRegistry {
            stages,
            filter_stage: self.filter_stage,
        })
    }
}

impl AnalyzerRegistry {
    pub fn builder() -> AnalyzerRegistryBuilder {
        AnalyzerRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredStage> {
        self.stages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    pub fn filter_stage(&self) -> Option<&RegisteredStage> {
        self.filter_stage.as_ref().and_then(|name| self.stages.get(name))
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.stages.get(name).map(|s| s.description.as_str())
    }

    pub fn stage_names(&self) -> Vec<&StageName> {
        let mut names: Vec<&StageName> = self.stages.keys().collect();
        names.sort();
        names
    }

    /// Every declared dependency of a requested stage must itself be requested
    /// earlier (or be the promoted filter stage).
    pub fn plan(
        &self,
        requested: &[StageName],
        policy: &FilterPolicy,
    ) -> Result<StagePlan, RegistryError> {
        let filter = if policy.is_active() {
            let stage = self.filter_stage().ok_or(RegistryError::NoFilterStage)?;
            Some(stage.name.clone())
        } else {
            None
        };

        let mut seen: HashSet<&StageName> = HashSet::new();
        for name in requested {
            if !self.stages.contains_key(name) {
                return Err(RegistryError::UnknownStage(name.to_string()));
            }
            if !seen.insert(name) {
                return Err(RegistryError::DuplicateStage(name.clone()));
            }
        }

        let stages: Vec<StageName> = requested
            .iter()
            .filter(|name| Some(*name) != filter.as_ref())
            .cloned()
            .collect();

        for (index, name) in stages.iter().enumerate() {
            let Some(stage) = self.stages.get(name) else {
                continue;
            };
            for dependency in &stage.depends_on {
                if Some(dependency) == filter.as_ref() {
                    continue;
                }
                match stages.iter().position(|s| s == dependency) {
                    None => {
                        return Err(RegistryError::MissingDependency {
                            stage: name.clone(),
                            dependency: dependency.clone(),
                        });
                    }
                    Some(position) if position > index => {
                        return Err(RegistryError::OrderViolation {
                            stage: name.clone(),
                            dependency: dependency.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(StagePlan { filter, stages })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),
    #[error("stage registered or requested twice: {0}")]
    DuplicateStage(StageName),
    #[error("stage {stage} depends on unregistered stage {dependency}")]
    UnknownDependency {
        stage: StageName,
        dependency: StageName,
    },
    #[error("stage dependency cycle through {0}")]
    DependencyCycle(StageName),
    #[error("stage {stage} requires {dependency}, which was not requested")]
    MissingDependency {
        stage: StageName,
        dependency: StageName,
    },
    #[error("stage {stage} must run after {dependency}")]
    OrderViolation {
        stage: StageName,
        dependency: StageName,
    },
    #[error("a filter policy was requested but no filter stage is configured")]
    NoFilterStage,
    #[error("filter stage {0} cannot declare dependencies")]
    FilterStageHasDependencies(StageName),
}
