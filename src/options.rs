//! Per-evaluation options record (C4). Effective options are composed by
//! the interpreter: engine defaults → parse-time pragmas → the context's
//! pragma processor → (transiently) annotations (§4.3).

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct JexlOptions {
    pub strict: bool,
    pub safe: bool,
    pub silent: bool,
    pub cancellable: bool,
    pub lexical: bool,
    pub lexical_shade: bool,
    pub shared_instance: bool,
    pub antish: bool,
    pub math_scale: i64,
    pub namespaces: HashMap<String, String>,
    pub imports: Vec<String>,
}

impl Default for JexlOptions {
    fn default() -> Self {
        JexlOptions {
            strict: true,
            safe: true,
            silent: false,
            cancellable: false,
            lexical: false,
            lexical_shade: false,
            shared_instance: true,
            antish: true,
            math_scale: -1,
            namespaces: HashMap::new(),
            imports: Vec::new(),
        }
    }
}

impl JexlOptions {
    /// `script.mode pro50`: `+strict +cancellable +lexical +lexicalShade
    /// -safe -sharedInstance`.
    pub fn apply_pro50_preset(&mut self) {
        self.strict = true;
        self.cancellable = true;
        self.lexical = true;
        self.lexical_shade = true;
        self.safe = false;
        self.shared_instance = false;
    }

    /// Handles the reserved pragma keys from §6; returns `true` if `key`
    /// was a built-in this applied, `false` if the caller should forward it
    /// to the context's pragma processor instead.
    pub fn apply_builtin_pragma(&mut self, key: &str, raw_value: &str) -> bool {
        match key {
            "jexl.strict" => {
                self.strict = parse_bool(raw_value);
                true
            }
            "jexl.silent" => {
                self.silent = parse_bool(raw_value);
                true
            }
            "jexl.safe" => {
                self.safe = parse_bool(raw_value);
                true
            }
            "jexl.import" => {
                self.imports.push(raw_value.to_string());
                true
            }
            "script.mode" if raw_value == "pro50" => {
                self.apply_pro50_preset();
                true
            }
            _ => {
                if let Some(prefix) = key.strip_prefix("jexl.namespace.") {
                    self.namespaces.insert(prefix.to_string(), raw_value.to_string());
                    true
                } else {
                    false
                }
            }
        }
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s, "true" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = JexlOptions::default();
        assert!(o.strict);
        assert!(o.safe);
        assert!(!o.silent);
    }

    #[test]
    fn pro50_preset() {
        let mut o = JexlOptions::default();
        o.apply_pro50_preset();
        assert!(o.strict && o.cancellable && o.lexical && o.lexical_shade);
        assert!(!o.safe && !o.shared_instance);
    }

    #[test]
    fn namespace_pragma() {
        let mut o = JexlOptions::default();
        assert!(o.apply_builtin_pragma("jexl.namespace.sleeper", "com.host.Sleeper"));
        assert_eq!(o.namespaces.get("sleeper").unwrap(), "com.host.Sleeper");
    }

    #[test]
    fn unknown_pragma_is_forwarded() {
        let mut o = JexlOptions::default();
        assert!(!o.apply_builtin_pragma("host.custom", "x"));
    }
}
