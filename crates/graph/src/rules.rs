//! Property rule matching.
//!
//! Configuration carries rules of match patterns and update actions. A rule
//! applies when any of its match maps applies; a map applies when every one
//! of its entries matches the property dictionary. Values support a trailing
//! `*` wildcard and a `!` negation prefix.

use runtime::Properties;

/// One match map: every entry must hold.
pub type Match = Vec<(String, String)>;

/// A rule of match patterns and property updates.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub matches: Vec<Match>,
    pub update_props: Vec<(String, String)>,
}

/// An ordered list of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Construct an empty rule set.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Run the rules over a property dictionary.
    ///
    /// Returns the number of properties changed by update actions.
    pub fn apply(&self, props: &mut Properties) -> usize {
        let mut changed = 0;

        for rule in &self.rules {
            if !rule.matches.iter().any(|m| match_map(props, m)) {
                continue;
            }

            for (key, value) in &rule.update_props {
                if props.insert(key, value) {
                    changed += 1;
                }
            }
        }

        changed
    }
}

fn match_map(props: &Properties, map: &Match) -> bool {
    map.iter().all(|(key, pattern)| {
        let value = props.get(key.as_str());

        match pattern.strip_prefix('!') {
            Some(pattern) => !value.is_some_and(|v| match_value(v, pattern)),
            None => value.is_some_and(|v| match_value(v, pattern)),
        }
    })
}

fn match_value(value: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => value == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(entries: &[(&str, &str)]) -> Properties {
        entries.iter().copied().collect()
    }

    fn rule(matches: &[&[(&str, &str)]], updates: &[(&str, &str)]) -> Rule {
        Rule {
            matches: matches
                .iter()
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| (String::from(*k), String::from(*v)))
                        .collect()
                })
                .collect(),
            update_props: updates
                .iter()
                .map(|(k, v)| (String::from(*k), String::from(*v)))
                .collect(),
        }
    }

    #[test]
    fn exact_match_updates() {
        let rules = RuleSet {
            rules: vec![rule(
                &[&[("node.name", "capture")]],
                &[("node.pause-on-idle", "false")],
            )],
        };

        let mut p = props(&[("node.name", "capture")]);
        assert_eq!(rules.apply(&mut p), 1);
        assert_eq!(p.get("node.pause-on-idle"), Some("false"));
    }

    #[test]
    fn wildcard_and_negation() {
        let rules = RuleSet {
            rules: vec![rule(
                &[&[("media.class", "Audio*"), ("node.name", "!monitor")]],
                &[("stream.is-live", "true")],
            )],
        };

        let mut yes = props(&[("media.class", "Audio/Source"), ("node.name", "mic")]);
        assert_eq!(rules.apply(&mut yes), 1);

        let mut no = props(&[("media.class", "Audio/Source"), ("node.name", "monitor")]);
        assert_eq!(rules.apply(&mut no), 0);
    }

    #[test]
    fn any_of_multiple_matches() {
        let rules = RuleSet {
            rules: vec![rule(
                &[&[("a", "1")], &[("b", "2")]],
                &[("hit", "true")],
            )],
        };

        let mut p = props(&[("b", "2")]);
        assert_eq!(rules.apply(&mut p), 1);
    }

    #[test]
    fn missing_key_fails_positive_match() {
        let rules = RuleSet {
            rules: vec![rule(&[&[("absent", "x")]], &[("hit", "true")])],
        };

        let mut p = props(&[("other", "y")]);
        assert_eq!(rules.apply(&mut p), 0);
    }

    #[test]
    fn unchanged_updates_do_not_count() {
        let rules = RuleSet {
            rules: vec![rule(&[&[("a", "1")]], &[("a", "1")])],
        };

        let mut p = props(&[("a", "1")]);
        assert_eq!(rules.apply(&mut p), 0);
    }
}
