//! Wiring: builds the pool, the engines and every background component,
//! then starts and stops them as one unit.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::coordinator::{Coordinator, CoordinatorConfig, GuardWatch};
use crate::engines::record::{RecordStore, Recorder};
use crate::engines::ui_guard::UiGuard;
use crate::engines::EngineCtx;
use crate::hud::{HudSink, LogHud, Severity};
use crate::logger;
use crate::manifest::Manifest;
use crate::orchestrator::{Handles, Orchestrator, OrchestratorConfig};
use crate::platform::{create_platform, Platform};
use crate::pool::StatePool;
use crate::prefs::{self, PrefsStore};
use crate::rules::RuleRegistry;
use crate::services::autofarm::AutofarmService;
use crate::services::focus::FocusService;
use crate::services::macros_repeat::MacrosRepeatService;
use crate::services::vitals::{project_vitals, VitalsService};
use crate::services::{Publish, Service, Worker};
use crate::settings::Settings;
use crate::transport::serial::SerialLink;
use crate::transport::{Controller, LineLink, NullLink};
use crate::types::{Command, WindowInfo};
use crate::vision::{TemplateStore, Vision};

const WINDOW_PERIOD: Duration = Duration::from_secs(1);
const VITALS_PERIOD: Duration = Duration::from_secs(1);
const FOCUS_PERIOD: Duration = Duration::from_secs(2);
const MACROS_PERIOD: Duration = Duration::from_secs(1);
const AUTOFARM_PERIOD: Duration = Duration::from_millis(200);

struct WatchInner {
    pool: StatePool,
    platform: Arc<dyn Platform>,
    hud: Arc<dyn HudSink>,
    title: String,
    waiting_shown: AtomicBool,
}

/// Keeps `window.info` pointing at the game window.
pub struct WindowWatcher {
    inner: Arc<WatchInner>,
    worker: Worker,
}

impl WindowWatcher {
    pub fn new(pool: StatePool, platform: Arc<dyn Platform>, hud: Arc<dyn HudSink>, title: &str) -> Self {
        Self {
            inner: Arc::new(WatchInner {
                pool,
                platform,
                hud,
                title: title.to_string(),
                waiting_shown: AtomicBool::new(false),
            }),
            worker: Worker::new("window"),
        }
    }

    /// One lookup. True when `window.info` changed.
    pub fn tick(&self) -> bool {
        self.inner.tick()
    }

    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        self.worker.start(WINDOW_PERIOD, move |_| {
            inner.tick();
        });
    }

    pub fn stop(&self) {
        self.worker.stop();
    }
}

impl WatchInner {
    fn tick(&self) -> bool {
        let pool = &self.pool;
        let current = WindowInfo::from_value(&pool.get("window.info", Value::Null));
        let found = match current.and_then(|w| self.platform.window_info(w.hwnd)) {
            Some(w) => Some((w, pool.get_str("window.title", ""))),
            None => self.platform.find_window(&self.title),
        };
        match found {
            Some((win, title)) if Some(win) != current => {
                pool.write("window", json!({ "info": win.to_value(), "title": title })).ok();
                if current.is_none() {
                    self.hud.status("window", Severity::Succ, &format!("window found: {}", title));
                }
                self.waiting_shown.store(false, Ordering::Release);
                true
            }
            Some(_) => false,
            None => {
                if current.is_some() {
                    pool.write("window", json!({ "info": null })).ok();
                    self.hud.status("window", Severity::Err, "game window lost");
                    return true;
                }
                if !self.waiting_shown.swap(true, Ordering::AcqRel) {
                    self.hud.status("window", Severity::Att, &format!("waiting for a '{}' window", self.title));
                }
                false
            }
        }
    }
}

/// Inputs to [`Runtime::build`].
pub struct RuntimeOptions {
    pub settings: Settings,
    pub base_dir: PathBuf,
    pub platform: Arc<dyn Platform>,
    pub link: Box<dyn LineLink>,
    /// Defaults to the logger-backed HUD.
    pub hud: Option<Arc<dyn HudSink>>,
    pub prefs: PrefsStore,
    pub records_dir: PathBuf,
    pub manifest: Manifest,
}

impl RuntimeOptions {
    /// Options for a real run from `settings.json` in `base_dir`.
    pub fn from_settings(settings: Settings, base_dir: PathBuf, force_stub: bool) -> Self {
        let platform = create_platform(force_stub || settings.stub);
        let port = settings.transport.resolved_port();
        let link: Box<dyn LineLink> = if port.is_empty() {
            logger::warn_p("serial", "no port configured, input is disabled");
            Box::new(NullLink)
        } else {
            match SerialLink::open(&port, settings.transport.baud) {
                Ok(link) => Box::new(link),
                Err(e) => {
                    logger::error_p("serial", &e.to_string());
                    Box::new(NullLink)
                }
            }
        };
        let manifest = Manifest::load(&Manifest::default_candidates(&base_dir));
        Self {
            settings,
            base_dir,
            platform,
            link,
            hud: None,
            prefs: PrefsStore::new(PrefsStore::default_path()),
            records_dir: RecordStore::default_dir(),
            manifest,
        }
    }
}

pub struct Runtime {
    pub pool: StatePool,
    pub ctx: EngineCtx,
    pub manifest: Manifest,
    prefs: PrefsStore,
    services: Vec<(Arc<dyn Service>, Duration)>,
    autofarm: Arc<AutofarmService>,
    ui_guard: Arc<UiGuard>,
    recorder: Arc<Recorder>,
    coordinator: Coordinator,
    window: WindowWatcher,
    orchestrator: Mutex<Option<Orchestrator>>,
    orch_thread: Mutex<Option<JoinHandle<()>>>,
    orch_stop: Arc<AtomicBool>,
    cmd_tx: mpsc::Sender<Command>,
    cmd_rx: Mutex<Option<mpsc::Receiver<Command>>>,
}

fn publish(f: impl Fn(Value) + Send + Sync + 'static) -> Publish {
    Arc::new(f)
}

impl Runtime {
    pub fn build(opts: RuntimeOptions) -> Result<Self> {
        let RuntimeOptions { settings, base_dir, platform, link, hud, prefs, records_dir, manifest } = opts;

        let pool = StatePool::with_defaults();
        prefs::load_into(&prefs, &manifest, &pool);
        if let Some(server) = settings.server.as_deref().filter(|s| !s.trim().is_empty()) {
            pool.set("config.server", json!(server.trim().to_lowercase()));
        }

        let rules = RuleRegistry::builtin();
        let server = pool.server();
        let set = match rules.get(&server) {
            Some(set) => set,
            None => {
                logger::warn(&format!("server '{}' has no rules, falling back to boh", server));
                pool.set("config.server", json!("boh"));
                rules.require("boh").context("built-in rules are missing")?
            }
        };

        let hud: Arc<dyn HudSink> = hud.unwrap_or_else(|| Arc::new(LogHud::new(pool.clone())));
        let root = settings.templates_root(&base_dir);
        if !root.is_dir() {
            logger::warn_p("vision", &format!("template root {} does not exist", root.display()));
        }
        let vision = Vision::new(platform.clone(), Arc::new(TemplateStore::new(root)));
        let controller = Controller::new(link, platform.clone());
        let ctx = EngineCtx::new(pool.clone(), vision.clone(), controller.clone(), hud.clone());

        let p = pool.clone();
        let vitals = Arc::new(VitalsService::new(
            pool.clone(),
            vision,
            set.vitals(),
            publish(move |v| project_vitals(&p, &v)),
        ));
        let p = pool.clone();
        let focus = Arc::new(FocusService::new(
            pool.clone(),
            platform.clone(),
            publish(move |v| {
                p.write("focus", v).ok();
            }),
        ));
        let macros = Arc::new(MacrosRepeatService::new(pool.clone(), controller));
        let autofarm = Arc::new(AutofarmService::new(ctx.clone(), set.autofarm()));
        let ui_guard = Arc::new(UiGuard::new(ctx.clone(), set.ui_guard()));
        let recorder = Arc::new(Recorder::new(ctx.clone(), RecordStore::new(records_dir)));

        let guard: Arc<dyn GuardWatch> = ui_guard.clone();
        let coordinator = Coordinator::new(pool.clone(), hud.clone(), Some(guard), CoordinatorConfig::default());
        let window = WindowWatcher::new(pool.clone(), platform, hud, &settings.window_title);

        let handles = Handles {
            ui_guard: Some(ui_guard.clone()),
            macros: Some(macros.clone()),
            autofarm: Some(autofarm.clone()),
            record: Some(recorder.clone()),
        };
        let orchestrator = Orchestrator::new(ctx.clone(), rules, handles, OrchestratorConfig::default());

        let services: Vec<(Arc<dyn Service>, Duration)> = vec![
            (vitals, VITALS_PERIOD),
            (focus, FOCUS_PERIOD),
            (macros, MACROS_PERIOD),
            (autofarm.clone(), AUTOFARM_PERIOD),
        ];
        let (cmd_tx, cmd_rx) = mpsc::channel();

        Ok(Self {
            pool,
            ctx,
            manifest,
            prefs,
            services,
            autofarm,
            ui_guard,
            recorder,
            coordinator,
            window,
            orchestrator: Mutex::new(Some(orchestrator)),
            orch_thread: Mutex::new(None),
            orch_stop: Arc::new(AtomicBool::new(false)),
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
        })
    }

    /// Channel the shell sends commands on.
    pub fn commands(&self) -> mpsc::Sender<Command> {
        self.cmd_tx.clone()
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub fn autofarm(&self) -> &Arc<AutofarmService> {
        &self.autofarm
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Start everything. The orchestrator can be started once.
    pub fn start(&self) -> Result<()> {
        let orchestrator = self.orchestrator.lock().take().context("runtime already started")?;
        let rx = self.cmd_rx.lock().take().context("command channel already taken")?;

        self.window.start();
        self.window.tick();
        for (svc, period) in &self.services {
            svc.start(*period);
            self.pool.write(&format!("services.{}", svc.name()), json!({ "running": svc.is_running() })).ok();
        }
        self.coordinator.start();
        self.recorder.start_listeners();

        let stop = Arc::clone(&self.orch_stop);
        let handle = thread::Builder::new()
            .name("orchestrator".into())
            .spawn(move || orchestrator.run(rx, stop))
            .context("failed to spawn the orchestrator")?;
        *self.orch_thread.lock() = Some(handle);
        logger::info("runtime started");
        Ok(())
    }

    /// Stop everything and persist preferences.
    pub fn shutdown(&self) {
        self.orch_stop.store(true, Ordering::Release);
        self.cmd_tx.send(Command::Quit).ok();
        if let Some(h) = self.orch_thread.lock().take() {
            h.join().ok();
        }
        self.coordinator.stop();
        for (svc, _) in &self.services {
            svc.stop();
            self.pool.write(&format!("services.{}", svc.name()), json!({ "running": false })).ok();
        }
        self.ui_guard.stop_watch();
        self.recorder.shutdown();
        self.window.stop();
        if let Err(e) = self.prefs.save(&self.pool) {
            logger::error_p("prefs", &format!("save failed: {}", e));
        }
        logger::info("runtime stopped");
    }
}
