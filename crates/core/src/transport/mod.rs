//! Line protocol to the input microcontroller plus OS cursor moves.
//!
//! | command | effect |
//! |---|---|
//! | `ping` | board answers `pong` |
//! | `l`, `0`..`9`, `esc`, `altB`, `pagedown`, ... | single key or chord |
//! | `click:X,Y` | OS cursor move, then hardware `l` |
//! | `move:X,Y` | OS cursor move only |
//! | `enter_text <t>` / `enter <t>` | type text (chat variant opens and submits) |

pub mod serial;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Result;
use crate::logger;
use crate::platform::Platform;
use crate::types::Point;

/// A newline-terminated command channel.
pub trait LineLink: Send {
    fn name(&self) -> &str;
    fn write_line(&mut self, line: &str) -> Result<()>;
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>>;
}

/// Used when no port is configured: commands are logged and fail.
pub struct NullLink;

impl LineLink for NullLink {
    fn name(&self) -> &str {
        "null"
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        logger::warn_p("serial", &format!("no device, dropped: {}", redact(line)));
        Err(crate::error::Error::Transport("no serial device".into()))
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Shared log of lines written through a [`RecordingLink`].
#[derive(Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<String>>>);

impl SentLog {
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, line: &str) -> usize {
        self.0.lock().iter().filter(|l| *l == line).count()
    }

    pub fn contains(&self, line: &str) -> bool {
        self.count(line) > 0
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

type SendHook = Box<dyn FnMut(&str) + Send>;

/// Test link: remembers every line, answers `ping` with `pong` and can run
/// a hook per line (to script how the game reacts).
pub struct RecordingLink {
    log: SentLog,
    hook: Option<SendHook>,
    replies: Vec<String>,
}

impl RecordingLink {
    pub fn new() -> (Self, SentLog) {
        let log = SentLog::default();
        (Self { log: log.clone(), hook: None, replies: Vec::new() }, log)
    }

    pub fn with_hook(hook: impl FnMut(&str) + Send + 'static) -> (Self, SentLog) {
        let (mut link, log) = Self::new();
        link.hook = Some(Box::new(hook));
        (link, log)
    }
}

impl LineLink for RecordingLink {
    fn name(&self) -> &str {
        "recording"
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.log.0.lock().push(line.to_string());
        if line == "ping" {
            self.replies.push("pong".into());
        }
        if let Some(hook) = self.hook.as_mut() {
            hook(line);
        }
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>> {
        Ok((!self.replies.is_empty()).then(|| self.replies.remove(0)))
    }
}

/// Typed text never reaches the log.
fn redact(line: &str) -> String {
    match line.split_once(' ') {
        Some((cmd, text)) => format!("{} <{} chars>", cmd, text.chars().count()),
        None => line.to_string(),
    }
}

fn parse_point(s: &str) -> Option<Point> {
    let (x, y) = s.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Process-wide input controller. Cloning shares the same link; every
/// command holds the link lock for its whole duration.
#[derive(Clone)]
pub struct Controller {
    link: Arc<Mutex<Box<dyn LineLink>>>,
    platform: Arc<dyn Platform>,
}

impl Controller {
    pub fn new(link: Box<dyn LineLink>, platform: Arc<dyn Platform>) -> Self {
        logger::info_p("serial", &format!("controller on {} link", link.name()));
        Self { link: Arc::new(Mutex::new(link)), platform }
    }

    /// Send one protocol command. Returns false on any failure.
    pub fn send(&self, cmd: &str) -> bool {
        let cmd = cmd.trim_end_matches('\n');
        if let Some(rest) = cmd.strip_prefix("click:") {
            let Some((x, y)) = parse_point(rest) else {
                logger::warn_p("serial", &format!("bad click command: {}", cmd));
                return false;
            };
            let mut link = self.link.lock();
            if !self.platform.move_cursor(x, y) {
                return false;
            }
            return Self::write(&mut **link, "l");
        }
        if let Some(rest) = cmd.strip_prefix("move:") {
            return match parse_point(rest) {
                Some((x, y)) => self.platform.move_cursor(x, y),
                None => {
                    logger::warn_p("serial", &format!("bad move command: {}", cmd));
                    false
                }
            };
        }
        let mut link = self.link.lock();
        Self::write(&mut **link, cmd)
    }

    fn write(link: &mut dyn LineLink, line: &str) -> bool {
        match link.write_line(line) {
            Ok(()) => true,
            Err(e) => {
                logger::error_p("serial", &format!("{}: {}", redact(line), e));
                false
            }
        }
    }

    pub fn click_at(&self, p: Point) -> bool {
        self.send(&format!("click:{},{}", p.0, p.1))
    }

    pub fn move_to(&self, p: Point) -> bool {
        self.send(&format!("move:{},{}", p.0, p.1))
    }

    /// Type text into the focused field.
    pub fn enter_text(&self, text: &str) -> bool {
        self.send(&format!("enter_text {}", text))
    }

    /// Send a chat line (open chat, type, submit).
    pub fn chat(&self, text: &str) -> bool {
        self.send(&format!("enter {}", text))
    }

    /// Health check: `ping` must be answered with `pong` within `timeout`.
    pub fn ping(&self, timeout: Duration) -> bool {
        let mut link = self.link.lock();
        if link.write_line("ping").is_err() {
            return false;
        }
        matches!(link.read_line(timeout), Ok(Some(ref s)) if s == "pong")
    }

    pub fn link_name(&self) -> String {
        self.link.lock().name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubPlatform;
    use crate::types::WindowInfo;

    fn controller() -> (Controller, SentLog, Arc<StubPlatform>) {
        let stub = Arc::new(StubPlatform::with_window(WindowInfo { x: 0, y: 0, width: 10, height: 10, hwnd: 1 }));
        let (link, log) = RecordingLink::new();
        (Controller::new(Box::new(link), stub.clone()), log, stub)
    }

    #[test]
    fn test_click_moves_then_presses() {
        let (ctl, log, stub) = controller();
        assert!(ctl.send("click:120,45"));
        assert_eq!(stub.cursor_log(), vec![(120, 45)]);
        assert_eq!(log.lines(), vec!["l"]);
    }

    #[test]
    fn test_move_is_os_only() {
        let (ctl, log, stub) = controller();
        assert!(ctl.move_to((3, 4)));
        assert!(log.lines().is_empty());
        assert_eq!(stub.cursor_log(), vec![(3, 4)]);
        assert!(!ctl.send("move:3"));
    }

    #[test]
    fn test_text_payload_verbatim() {
        let (ctl, log, _) = controller();
        assert!(ctl.chat("/target Gnome smith"));
        assert_eq!(log.lines(), vec!["enter /target Gnome smith"]);
        assert_eq!(redact("enter_text secret pw"), "enter_text <9 chars>");
    }

    #[test]
    fn test_ping_pong() {
        let (ctl, _, _) = controller();
        assert!(ctl.ping(Duration::from_millis(10)));
    }

    #[test]
    fn test_null_link_fails() {
        let stub = Arc::new(StubPlatform::new());
        let ctl = Controller::new(Box::new(NullLink), stub);
        assert!(!ctl.send("l"));
        assert!(!ctl.ping(Duration::from_millis(1)));
    }
}
