//! Per-server behavior. Each supported server ships a [`ServerRuleSet`] with
//! its data tables; the orchestrator looks it up by `config.server`.

pub mod boh;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engines::autofarm::AutofarmData;
use crate::engines::record::Recorder;
use crate::engines::ui_guard::{UiGuard, UiGuardData};
use crate::engines::{EngineCtx, StepOutcome};
use crate::services::autofarm::AutofarmService;
use crate::services::macros_repeat::MacrosRepeatService;
use crate::services::vitals::VitalsConfig;
use crate::snapshot::Snapshot;
use crate::{Error, Result};

/// Everything a step may touch. Services are optional so a rule set can be
/// driven without the runtime around it.
#[derive(Clone, Copy)]
pub struct RuleCtx<'a> {
    pub eng: &'a EngineCtx,
    pub ui_guard: Option<&'a UiGuard>,
    pub macros: Option<&'a MacrosRepeatService>,
    pub autofarm: Option<&'a AutofarmService>,
    pub record: Option<&'a Recorder>,
}

impl<'a> RuleCtx<'a> {
    pub fn bare(eng: &'a EngineCtx) -> Self {
        Self { eng, ui_guard: None, macros: None, autofarm: None, record: None }
    }
}

pub trait ServerRuleSet: Send + Sync {
    fn server(&self) -> &'static str;

    /// Run one pipeline step. `Err` is treated by the caller as `(false, true)`.
    fn run_step(&self, ctx: &RuleCtx<'_>, step: &str, snap: &Snapshot) -> Result<StepOutcome>;

    fn vitals(&self) -> VitalsConfig;

    fn ui_guard(&self) -> UiGuardData;

    fn autofarm(&self) -> AutofarmData;
}

/// Rule sets keyed by server id.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    sets: BTreeMap<&'static str, Arc<dyn ServerRuleSet>>,
}

impl RuleRegistry {
    /// Registry with every server this build knows.
    pub fn builtin() -> Self {
        let mut reg = Self::default();
        reg.register(Arc::new(boh::Boh));
        reg
    }

    pub fn register(&mut self, set: Arc<dyn ServerRuleSet>) {
        self.sets.insert(set.server(), set);
    }

    pub fn get(&self, server: &str) -> Option<Arc<dyn ServerRuleSet>> {
        self.sets.get(server).cloned()
    }

    /// Like [`get`](Self::get) but an unknown server is an error.
    pub fn require(&self, server: &str) -> Result<Arc<dyn ServerRuleSet>> {
        self.get(server).ok_or_else(|| Error::NoRule { server: server.to_string(), step: String::new() })
    }

    pub fn servers(&self) -> Vec<&'static str> {
        self.sets.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_reference_server() {
        let reg = RuleRegistry::builtin();
        assert_eq!(reg.servers(), vec!["boh"]);
        assert!(reg.get("boh").is_some());
        assert!(matches!(reg.require("l2mad"), Err(Error::NoRule { .. })));
    }
}
