//! Process classification into logical roles.
//!
//! Classification is driven by a single ordered rule table. Each rule pairs a
//! match predicate over the lowercased command line with an optional exclusion
//! predicate. Rules are checked in ascending priority; the first rule that
//! matches and is not excluded wins.

use ahash::AHashMap as HashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as FmtWrite;
use tracing::debug;

use crate::config::ConfigError;
use crate::roles::Role;

/// One OS process as reported by the process source for a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    pub pid: u32,
    pub cmdline: String,
    pub ppid: u32,
}

/// Rule entry as written in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub role: Role,
    /// Lower priorities are evaluated first.
    pub priority: u32,
    /// Substrings of the normalized command line; any hit matches.
    #[serde(default)]
    pub matches: Vec<String>,
    /// Optional regex over the normalized command line, ORed with `matches`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// Substrings that veto this rule even when it matches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_regex: Option<String>,
}

impl RuleEntry {
    pub fn new(role: Role, priority: u32, matches: &[&str], excludes: &[&str]) -> Self {
        Self {
            role,
            priority,
            matches: matches.iter().map(|s| s.to_string()).collect(),
            regex: None,
            excludes: excludes.iter().map(|s| s.to_string()).collect(),
            exclude_regex: None,
        }
    }
}

/// A predicate over a normalized command line.
#[derive(Debug, Clone)]
struct Predicate {
    substrings: Vec<String>,
    regex: Option<Regex>,
}

impl Predicate {
    fn compile(substrings: &[String], regex: Option<&str>) -> Result<Self, ConfigError> {
        let regex = regex
            .map(|r| {
                Regex::new(&format!("(?i){}", r)).map_err(|e| ConfigError::InvalidPattern {
                    pattern: r.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            substrings: substrings
                .iter()
                .map(|s| normalize_cmdline(s))
                .filter(|s| !s.is_empty())
                .collect(),
            regex,
        })
    }

    fn is_empty(&self) -> bool {
        self.substrings.is_empty() && self.regex.is_none()
    }

    fn test(&self, cmdline: &str) -> bool {
        self.substrings.iter().any(|s| cmdline.contains(s.as_str()))
            || self.regex.as_ref().is_some_and(|r| r.is_match(cmdline))
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    role: Role,
    priority: u32,
    include: Predicate,
    exclude: Option<Predicate>,
}

/// Compiled, immutable rule table.
#[derive(Debug, Clone)]
pub struct ProcessClassifier {
    rules: Vec<CompiledRule>,
}

/// Lowercases a command line so all matching happens in one case.
pub fn normalize_cmdline(cmdline: &str) -> String {
    cmdline.trim().to_lowercase()
}

impl ProcessClassifier {
    /// Compiles a rule table. Fails on an empty table, a rule with nothing to
    /// match, or an invalid regex.
    pub fn new(entries: &[RuleEntry]) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyRuleTable);
        }

        let mut rules = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let include = Predicate::compile(&entry.matches, entry.regex.as_deref())?;
            if include.is_empty() {
                return Err(ConfigError::EmptyRule { index });
            }
            let exclude = Predicate::compile(&entry.excludes, entry.exclude_regex.as_deref())?;
            rules.push(CompiledRule {
                role: entry.role,
                priority: entry.priority,
                include,
                exclude: (!exclude.is_empty()).then_some(exclude),
            });
        }

        // Stable sort keeps file order for equal priorities.
        rules.sort_by_key(|r| r.priority);

        for role in Role::ALL {
            if !rules.iter().any(|r| r.role == role) {
                return Err(ConfigError::RoleWithoutRule(role));
            }
        }

        Ok(Self { rules })
    }

    /// Resolves a single command line to a role, or `None` when no rule applies.
    pub fn classify_cmdline(&self, cmdline: &str) -> Option<Role> {
        let normalized = normalize_cmdline(cmdline);
        if normalized.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| {
                rule.include.test(&normalized)
                    && !rule.exclude.as_ref().is_some_and(|ex| ex.test(&normalized))
            })
            .map(|rule| rule.role)
    }

    /// Classifies a fresh process snapshot. Unmatched processes are absent
    /// from the result.
    pub fn classify(&self, processes: &[ProcessDescriptor]) -> HashMap<u32, Role> {
        let mut out = HashMap::with_capacity(4);
        for p in processes {
            match self.classify_cmdline(&p.cmdline) {
                Some(role) => {
                    out.insert(p.pid, role);
                }
                None => debug!(pid = p.pid, "Process matches no rule, skipping"),
            }
        }
        out
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Built-in rule table for the pastewise application.
///
/// The service binary name is a prefix of the supervisor's, so the service
/// rule carries the supervisor markers as exclusions.
pub fn default_rules() -> Vec<RuleEntry> {
    vec![
        RuleEntry::new(
            Role::Supervisor,
            10,
            &["pastewise-agent-menu", "pastewise_agent_menu", "pastewise.agent_menu"],
            &[],
        ),
        RuleEntry::new(
            Role::Service,
            20,
            &["pastewise-agent", "pastewise_agent", "pastewise.agent"],
            &["agent-menu", "agent_menu"],
        ),
    ]
}

/// Renders a rule table as plain text, in evaluation order.
pub fn render_rules(rules: &[RuleEntry]) -> String {
    let mut sorted: Vec<&RuleEntry> = rules.iter().collect();
    sorted.sort_by_key(|r| r.priority);

    let mut out = String::new();
    writeln!(out, "{:>8}  {:12} {:40} EXCLUDES", "PRIORITY", "ROLE", "MATCHES").ok();
    writeln!(out, "{}", "-".repeat(80)).ok();
    for rule in sorted {
        let mut matches = rule.matches.join(", ");
        if let Some(re) = &rule.regex {
            if !matches.is_empty() {
                matches.push_str(", ");
            }
            matches.push_str(&format!("/{}/", re));
        }
        let mut excludes = rule.excludes.join(", ");
        if let Some(re) = &rule.exclude_regex {
            if !excludes.is_empty() {
                excludes.push_str(", ");
            }
            excludes.push_str(&format!("/{}/", re));
        }
        writeln!(
            out,
            "{:>8}  {:12} {:40} {}",
            rule.priority,
            rule.role.as_str(),
            matches,
            if excludes.is_empty() { "-" } else { excludes.as_str() }
        )
        .ok();
    }
    out
}
