//! Template lookup under `<root>/<engine>/<server>/<lang|common>/...`.
//!
//! Only files found by a directory walk at first use (the whitelist) can
//! resolve. The first part selects the base directory: `"<lang>"` means the
//! requested language with the `rus → eng` fallback chain, `"common"` the
//! shared directory, and an explicit `rus`/`eng` pins that language.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use image::GrayImage;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::logger;

pub const LANG_PLACEHOLDER: &str = "<lang>";
pub const COMMON_DIR: &str = "common";
const LANG_DIRS: [&str; 2] = ["rus", "eng"];

/// Build an owned parts list.
pub fn parts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// `ru`/`russian` → `rus`, `en`/`english` → `eng`; anything else → `rus`.
pub fn normalize_lang(lang: &str) -> &'static str {
    match lang.trim().to_lowercase().as_str() {
        "en" | "eng" | "english" => "eng",
        _ => "rus",
    }
}

/// A single path segment: non-empty, no separators, no `..`, not absolute.
fn safe_segment(seg: &str) -> bool {
    if seg.is_empty() || seg.contains('/') || seg.contains('\\') || seg.contains(':') {
        return false;
    }
    let mut comps = Path::new(seg).components();
    matches!((comps.next(), comps.next()), (Some(Component::Normal(_)), None))
}

struct EngineDir {
    root: PathBuf,
    /// `"<dir>/<rel>"` for every png under the language and common dirs.
    allowed: HashSet<String>,
}

impl EngineDir {
    fn scan(root: PathBuf) -> Self {
        let mut allowed = HashSet::new();
        for dir in LANG_DIRS.iter().chain(std::iter::once(&COMMON_DIR)) {
            walk(&root.join(dir), dir, &mut allowed);
        }
        Self { root, allowed }
    }
}

fn walk(dir: &Path, prefix: &str, out: &mut HashSet<String>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if path.is_dir() {
            walk(&path, &format!("{}/{}", prefix, name), out);
        } else if name.to_lowercase().ends_with(".png") {
            out.insert(format!("{}/{}", prefix, name));
        }
    }
}

/// Resolves and caches decoded templates.
pub struct TemplateStore {
    root: PathBuf,
    engines: Mutex<HashMap<(String, String), Arc<EngineDir>>>,
    cache: Mutex<HashMap<PathBuf, Arc<GrayImage>>>,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), engines: Mutex::new(HashMap::new()), cache: Mutex::new(HashMap::new()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn engine_dir(&self, engine: &str, server: &str) -> Option<Arc<EngineDir>> {
        if !safe_segment(engine) || !safe_segment(server) {
            return None;
        }
        let key = (engine.to_string(), server.to_string());
        let mut engines = self.engines.lock();
        let dir = engines
            .entry(key)
            .or_insert_with(|| Arc::new(EngineDir::scan(self.root.join(engine).join(server))));
        Some(Arc::clone(dir))
    }

    /// Candidate base directories for `head`, in lookup order.
    fn bases(head: &str, lang: &str) -> Option<Vec<&'static str>> {
        match head {
            LANG_PLACEHOLDER | "lang" => {
                let mut chain = vec![normalize_lang(lang)];
                for l in LANG_DIRS {
                    if !chain.contains(&l) {
                        chain.push(l);
                    }
                }
                Some(chain)
            }
            COMMON_DIR => Some(vec![COMMON_DIR]),
            "rus" => Some(vec!["rus"]),
            "eng" => Some(vec!["eng"]),
            _ => None,
        }
    }

    /// Absolute path of the template, if whitelisted and inside the root.
    pub fn resolve(&self, engine: &str, server: &str, lang: &str, parts: &[String]) -> Option<PathBuf> {
        let (head, rest) = parts.split_first()?;
        if rest.is_empty() || !rest.iter().all(|p| safe_segment(p)) {
            return None;
        }
        let dir = self.engine_dir(engine, server)?;
        let canon_root = fs::canonicalize(&dir.root).ok()?;
        let rel = rest.join("/");
        for base in Self::bases(head, lang)? {
            if !dir.allowed.contains(&format!("{}/{}", base, rel)) {
                continue;
            }
            let mut path = dir.root.join(base);
            path.extend(rest);
            let Ok(canon) = fs::canonicalize(&path) else { continue };
            if canon.starts_with(&canon_root) && canon.is_file() {
                return Some(canon);
            }
        }
        None
    }

    pub fn exists(&self, engine: &str, server: &str, lang: &str, parts: &[String]) -> bool {
        self.resolve(engine, server, lang, parts).is_some()
    }

    /// Decoded greyscale template, cached per resolved path.
    pub fn load(&self, engine: &str, server: &str, lang: &str, parts: &[String]) -> Result<Arc<GrayImage>> {
        let path = self
            .resolve(engine, server, lang, parts)
            .ok_or_else(|| Error::template_missing(engine, server, parts))?;
        if let Some(img) = self.cache.lock().get(&path) {
            return Ok(Arc::clone(img));
        }
        let img = image::open(&path)
            .map_err(|source| Error::Image { path: path.clone(), source })?
            .to_luma8();
        let img = Arc::new(img);
        self.cache.lock().insert(path, Arc::clone(&img));
        Ok(img)
    }

    /// Drop whitelists and decoded templates (after assets change on disk).
    pub fn invalidate(&self) {
        self.engines.lock().clear();
        self.cache.lock().clear();
        logger::info_p("vision", "template cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(files: &[&str]) -> (tempfile::TempDir, TemplateStore) {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            let p = dir.path().join(f);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            GrayImage::from_fn(4, 4, |x, y| image::Luma([(x * 40 + y * 7) as u8])).save(&p).unwrap();
        }
        let store = TemplateStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_language_fallback_chain() {
        let (_d, store) = store_with(&[
            "respawn/boh/rus/death_banner.png",
            "respawn/boh/eng/only_eng.png",
        ]);
        let p = store.resolve("respawn", "boh", "eng", &parts(&["<lang>", "death_banner.png"])).unwrap();
        assert!(p.ends_with("rus/death_banner.png"));
        assert!(store.exists("respawn", "boh", "rus", &parts(&["<lang>", "only_eng.png"])));
        assert!(!store.exists("respawn", "boh", "rus", &parts(&["rus", "only_eng.png"])));
    }

    #[test]
    fn test_common_dir_and_nesting() {
        let (_d, store) = store_with(&["dashboard/boh/common/buffer/icons/songs/song_of_earth.png"]);
        let ps = parts(&["common", "buffer", "icons", "songs", "song_of_earth.png"]);
        assert!(store.exists("dashboard", "boh", "rus", &ps));
        let img = store.load("dashboard", "boh", "rus", &ps).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
    }

    #[test]
    fn test_traversal_never_resolves() {
        let (d, store) = store_with(&["respawn/boh/rus/a.png", "secret.png"]);
        for bad in [
            parts(&["<lang>", "..", "..", "..", "secret.png"]),
            parts(&["<lang>", "../a.png"]),
            parts(&["<lang>", ""]),
            parts(&["<lang>", "sub\\a.png"]),
            parts(&["/etc", "passwd"]),
            parts(&["<lang>"]),
        ] {
            assert!(store.resolve("respawn", "boh", "rus", &bad).is_none(), "{:?}", bad);
        }
        assert!(store.resolve("..", "boh", "rus", &parts(&["<lang>", "a.png"])).is_none());
        let ok = store.resolve("respawn", "boh", "rus", &parts(&["<lang>", "a.png"])).unwrap();
        assert!(ok.starts_with(fs::canonicalize(d.path()).unwrap()));
    }

    #[test]
    fn test_missing_template_error() {
        let (_d, store) = store_with(&[]);
        let err = store.load("buff", "boh", "rus", &parts(&["<lang>", "x.png"])).unwrap_err();
        assert!(err.is_missing_asset());
    }
}
