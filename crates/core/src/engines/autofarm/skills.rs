use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::services::macros_repeat::normalize_key;

pub const DEFAULT_CAST_MS: u64 = 850;

/// One attack skill: the key to press, how long the cast locks the
/// character, and the skill's own cooldown.
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    pub key: String,
    pub slug: String,
    pub cast_ms: u64,
    pub cooldown_ms: u64,
}

fn millis(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_f64().map(|f| f.max(0.0) as u64),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.max(0.0) as u64),
        _ => None,
    }
}

impl Skill {
    /// None for rows without a key.
    pub fn from_value(v: &Value) -> Option<Self> {
        let key = match v.get("key")? {
            Value::String(s) if !s.trim().is_empty() => normalize_key(s),
            Value::Number(n) => normalize_key(&n.to_string()),
            _ => return None,
        };
        let slug = v.get("slug").and_then(Value::as_str).unwrap_or("").trim().to_string();
        let cast_ms = v.get("cast_ms").and_then(millis).unwrap_or(DEFAULT_CAST_MS);
        let cooldown_ms = ["cooldown_ms", "cd_ms", "cooldown", "cd"]
            .iter()
            .find_map(|k| v.get(*k).and_then(millis))
            .unwrap_or(cast_ms);
        Some(Self { key, slug, cast_ms, cooldown_ms })
    }

    pub fn id(&self) -> String {
        if self.slug.is_empty() {
            format!("key:{}", self.key)
        } else {
            self.slug.clone()
        }
    }
}

/// Picks the next skill to press during one fight. Last-use times live in
/// `cd_map` so cooldowns carry over between fights.
pub struct SkillPlanner<'a> {
    skills: &'a [Skill],
    cd_map: &'a mut HashMap<String, f64>,
    casting_until: f64,
    last_id: Option<String>,
    presses: u32,
    used: HashSet<String>,
}

impl<'a> SkillPlanner<'a> {
    pub fn new(skills: &'a [Skill], cd_map: &'a mut HashMap<String, f64>) -> Self {
        Self { skills, cd_map, casting_until: 0.0, last_id: None, presses: 0, used: HashSet::new() }
    }

    pub fn casting(&self, now: f64) -> bool {
        now < self.casting_until
    }

    fn age(&self, skill: &Skill, now: f64) -> f64 {
        self.cd_map.get(&skill.id()).map_or(f64::INFINITY, |t| now - t)
    }

    fn ready(&self, skill: &Skill, now: f64) -> bool {
        self.age(skill, now) * 1000.0 >= skill.cooldown_ms as f64
    }

    /// Index of the ready skill with the longest cooldown, oldest use first
    /// on ties. After the first press a different skill than the last one is
    /// preferred when any is ready.
    pub fn pick(&self, now: f64) -> Option<usize> {
        if self.casting(now) {
            return None;
        }
        let best = |skip: Option<&str>| {
            self.skills
                .iter()
                .enumerate()
                .filter(|(_, s)| self.ready(s, now) && skip.map_or(true, |id| s.id() != id))
                .max_by(|(_, a), (_, b)| {
                    a.cooldown_ms
                        .cmp(&b.cooldown_ms)
                        .then(self.age(a, now).total_cmp(&self.age(b, now)))
                })
                .map(|(i, _)| i)
        };
        best(self.last_id.as_deref()).or_else(|| best(None))
    }

    pub fn mark(&mut self, idx: usize, now: f64) {
        let Some(skill) = self.skills.get(idx) else { return };
        let id = skill.id();
        self.cd_map.insert(id.clone(), now);
        self.casting_until = now + skill.cast_ms as f64 / 1000.0;
        self.used.insert(id.clone());
        self.last_id = Some(id);
        self.presses += 1;
    }

    /// Seconds until the cast ends or the next skill comes off cooldown.
    pub fn next_ready_in(&self, now: f64) -> f64 {
        if self.casting(now) {
            return self.casting_until - now;
        }
        self.skills
            .iter()
            .map(|s| (s.cooldown_ms as f64 / 1000.0 - self.age(s, now)).max(0.0))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn presses(&self) -> u32 {
        self.presses
    }

    pub fn all_used(&self) -> bool {
        self.skills.iter().all(|s| self.used.contains(&s.id()))
    }
}
