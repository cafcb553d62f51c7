use std::collections::BTreeSet;
use std::fmt::{self, Write};
use std::str::FromStr;

use crate::models::Department;

/// Starting state for the matrix before any admin edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPolicy {
    AllowAll,
    DenyAll,
}

impl FromStr for PermissionPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow-all" | "allow" => Ok(Self::AllowAll),
            "deny-all" | "deny" => Ok(Self::DenyAll),
            other => Err(format!("unknown permission policy '{other}'")),
        }
    }
}

impl fmt::Display for PermissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionPolicy::AllowAll => write!(f, "allow-all"),
            PermissionPolicy::DenyAll => write!(f, "deny-all"),
        }
    }
}

/// Which departments may rate which. Self-rating pairs are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMatrix {
    allowed: BTreeSet<(i32, i32)>,
}

impl PermissionMatrix {
    pub fn with_policy(departments: &[Department], policy: PermissionPolicy) -> Self {
        let mut matrix = Self::default();
        if policy == PermissionPolicy::AllowAll {
            for from in departments {
                for to in departments {
                    matrix.grant(from.id, to.id);
                }
            }
        }
        matrix
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (i32, i32)>) -> Self {
        let mut matrix = Self::default();
        for (from, to) in pairs {
            matrix.grant(from, to);
        }
        matrix
    }

    pub fn is_allowed(&self, from: i32, to: i32) -> bool {
        from != to && self.allowed.contains(&(from, to))
    }

    /// Diagonal pairs are ignored.
    pub fn grant(&mut self, from: i32, to: i32) {
        if from != to {
            self.allowed.insert((from, to));
        }
    }

    pub fn revoke(&mut self, from: i32, to: i32) {
        self.allowed.remove(&(from, to));
    }

    /// Flips a cell and returns its new state. Diagonal cells stay denied.
    pub fn toggle(&mut self, from: i32, to: i32) -> bool {
        if self.is_allowed(from, to) {
            self.revoke(from, to);
            false
        } else {
            self.grant(from, to);
            self.is_allowed(from, to)
        }
    }

    pub fn allowed_targets(&self, from: i32) -> Vec<i32> {
        self.allowed
            .range((from, i32::MIN)..=(from, i32::MAX))
            .map(|(_, to)| *to)
            .collect()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.allowed.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn render(&self, departments: &[Department]) -> String {
        let mut output = String::new();
        let _ = write!(output, "{:>4}", "");
        for to in departments {
            let _ = write!(output, "{:>4}", to.id);
        }
        let _ = writeln!(output);

        for from in departments {
            let _ = write!(output, "{:>4}", from.id);
            for to in departments {
                let cell = if from.id == to.id {
                    "#"
                } else if self.is_allowed(from.id, to.id) {
                    "x"
                } else {
                    "."
                };
                let _ = write!(output, "{cell:>4}");
            }
            let _ = writeln!(output, "  {}", from.name);
        }

        output
    }
}
