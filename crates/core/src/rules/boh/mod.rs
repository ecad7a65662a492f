//! Reference server `boh`.

pub mod data;

use super::{RuleCtx, ServerRuleSet};
use crate::engines::autofarm::{self, AutofarmData};
use crate::engines::stabilize::{self, Anchors};
use crate::engines::ui_guard::UiGuardData;
use crate::engines::{buff, macros, record, respawn, teleport, StepOutcome};
use crate::logger;
use crate::services::vitals::VitalsConfig;
use crate::snapshot::Snapshot;
use crate::{Error, Result};

pub struct Boh;

impl ServerRuleSet for Boh {
    fn server(&self) -> &'static str {
        "boh"
    }

    fn run_step(&self, ctx: &RuleCtx<'_>, step: &str, snap: &Snapshot) -> Result<StepOutcome> {
        let eng = ctx.eng;
        let out = match step {
            "respawn" => {
                let out = respawn::run(eng, &data::respawn(), snap);
                if out == (true, true) {
                    if let Some(m) = ctx.macros {
                        m.bump_all();
                    }
                }
                out
            }
            "buff" => buff::run(eng, &data::buff(), snap, ctx.ui_guard),
            "macros" => macros::run(eng, snap, ctx.macros),
            "teleport" => {
                let anchors = Anchors::load(&eng.data_file(stabilize::ENGINE, "anchors.json"));
                teleport::run(eng, &data::teleport(), &data::stabilize(), &anchors, snap, ctx.ui_guard)
            }
            "record" => record::run(eng, snap, ctx.record),
            "autofarm" => autofarm::run(eng, snap, ctx.autofarm),
            other => {
                logger::warn_p("pipeline", &format!("boh has no step '{}'", other));
                return Err(Error::NoRule { server: self.server().into(), step: other.into() });
            }
        };
        Ok(out)
    }

    fn vitals(&self) -> VitalsConfig {
        data::vitals()
    }

    fn ui_guard(&self) -> UiGuardData {
        data::ui_guard()
    }

    fn autofarm(&self) -> AutofarmData {
        data::autofarm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::testkit::kit;
    use serde_json::json;

    #[test]
    fn test_unknown_step_is_an_error() {
        let k = kit();
        let snap = Snapshot::build(&k.ctx.pool);
        let r = Boh.run_step(&RuleCtx::bare(&k.ctx), "fishing", &snap);
        assert!(matches!(r, Err(Error::NoRule { ref step, .. }) if step == "fishing"));
    }

    #[test]
    fn test_respawn_when_already_alive() {
        let k = kit();
        k.ctx.pool.write("player", json!({ "alive": true, "hp_ratio": 1.0 })).unwrap();
        let snap = Snapshot::build(&k.ctx.pool);
        assert_eq!(Boh.run_step(&RuleCtx::bare(&k.ctx), "respawn", &snap).unwrap(), (true, true));
        assert!(k.log.lines().is_empty());
    }

    #[test]
    fn test_macros_without_rows_advances() {
        let k = kit();
        k.ctx.pool.write("features.macros", json!({ "enabled": true, "rows": [] })).unwrap();
        let snap = Snapshot::build(&k.ctx.pool);
        assert_eq!(Boh.run_step(&RuleCtx::bare(&k.ctx), "macros", &snap).unwrap(), (false, true));
    }

    #[test]
    fn test_autofarm_without_service_advances() {
        let k = kit();
        k.ctx.pool.write("features.autofarm", json!({ "enabled": true })).unwrap();
        k.ctx.pool.write("player", json!({ "alive": true })).unwrap();
        let snap = Snapshot::build(&k.ctx.pool);
        assert_eq!(Boh.run_step(&RuleCtx::bare(&k.ctx), "autofarm", &snap).unwrap(), (false, true));
    }
}
