use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;

/// `(lang, parts) -> exists` used by `click_village` / `click_location`.
pub type PartsResolver = Arc<dyn Fn(&str, &[String]) -> bool + Send + Sync>;

/// Values a flow can reference: account fields, teleport target and an
/// open map for `{key}` placeholders.
#[derive(Clone, Default)]
pub struct Extras {
    pub login: String,
    pub password: String,
    pub pin: String,
    pub category_id: String,
    pub location_id: String,
    pub resolver: Option<PartsResolver>,
    pub vars: HashMap<String, String>,
}

impl fmt::Debug for Extras {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Account fields stay out of logs.
        f.debug_struct("Extras")
            .field("category_id", &self.category_id)
            .field("location_id", &self.location_id)
            .field("vars", &self.vars.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn placeholder_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").ok()).as_ref()
}

impl Extras {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        match key {
            "account_login" | "login" => Some(&self.login),
            "account_password" | "password" => Some(&self.password),
            "account_pin" | "pin" => Some(&self.pin),
            "category_id" => Some(&self.category_id),
            "location_id" => Some(&self.location_id),
            _ => self.vars.get(key).map(String::as_str),
        }
    }

    /// Expand `{account.login}`, `{account.password}`, `{account_pin}` and
    /// generic `{key}` placeholders. Unknown keys stay verbatim.
    pub fn expand(&self, text: &str) -> String {
        let text = text
            .replace("{account.login}", &self.login)
            .replace("{account.password}", &self.password)
            .replace("{account.pin}", &self.pin);
        let Some(re) = placeholder_re() else { return text };
        re.replace_all(&text, |caps: &regex::Captures<'_>| {
            self.lookup(&caps[1]).map_or_else(|| caps[0].to_string(), str::to_string)
        })
        .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_placeholders() {
        let ex = Extras { login: "hero".into(), pin: "4321".into(), ..Default::default() }.with_var("mode_key", "mage");
        assert_eq!(ex.expand("{account.login}:{account_pin}"), "hero:4321");
        assert_eq!(ex.expand("mode={mode_key} {missing}"), "mode=mage {missing}");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let ex = Extras { password: "hunter2".into(), ..Default::default() };
        assert!(!format!("{:?}", ex).contains("hunter2"));
    }
}
