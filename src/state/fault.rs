// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fault dumps and their diffs.
//!
//! A `CURRENT-FAULTS` message is a total dump, not a delta. Each dump
//! replaces the previous [`FaultSnapshot`]; the [`FaultDiff`] between the two
//! names the codes that started or stopped failing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Section of a fault dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultSection {
    /// `product-errors`
    ProductErrors,
    /// `product-warnings`
    ProductWarnings,
    /// `module-errors`
    ModuleErrors,
    /// `module-warnings`
    ModuleWarnings,
}

impl FaultSection {
    /// All sections in wire order.
    pub const ALL: [Self; 4] = [
        Self::ProductErrors,
        Self::ProductWarnings,
        Self::ModuleErrors,
        Self::ModuleWarnings,
    ];

    /// Returns the wire name of the section.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProductErrors => "product-errors",
            Self::ProductWarnings => "product-warnings",
            Self::ModuleErrors => "module-errors",
            Self::ModuleWarnings => "module-warnings",
        }
    }
}

impl fmt::Display for FaultSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a fault code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultStatus {
    /// `OK`
    #[serde(rename = "OK")]
    Ok,
    /// `FAIL`
    #[serde(rename = "FAIL")]
    Fail,
}

impl FaultStatus {
    /// Parses the wire value. Anything other than `OK` or `FAIL` is `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OK" => Some(Self::Ok),
            "FAIL" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// A single fault code with its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    /// Device-specific fault code.
    pub code: String,
    /// Reported status.
    pub status: FaultStatus,
    /// Section the code was reported under.
    pub section: FaultSection,
}

/// A complete fault dump.
///
/// # Examples
///
/// ```
/// use applink_lib::state::{FaultSection, FaultSnapshot, FaultStatus};
///
/// let mut before = FaultSnapshot::new();
/// before.insert(FaultSection::ProductErrors, "fltr", FaultStatus::Ok);
///
/// let mut after = FaultSnapshot::new();
/// after.insert(FaultSection::ProductErrors, "fltr", FaultStatus::Fail);
///
/// let diff = before.diff(&after);
/// assert_eq!(diff.newly_failing().count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultSnapshot {
    entries: BTreeMap<FaultSection, BTreeMap<String, FaultStatus>>,
}

impl FaultSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the status of a code. A later call for the same code replaces it.
    pub fn insert(&mut self, section: FaultSection, code: impl Into<String>, status: FaultStatus) {
        self.entries
            .entry(section)
            .or_default()
            .insert(code.into(), status);
    }

    /// Returns the status of a code, if it was reported.
    #[must_use]
    pub fn status(&self, section: FaultSection, code: &str) -> Option<FaultStatus> {
        self.entries.get(&section)?.get(code).copied()
    }

    /// Returns every record, ordered by section then code.
    pub fn records(&self) -> impl Iterator<Item = FaultRecord> + '_ {
        self.entries.iter().flat_map(|(section, codes)| {
            codes.iter().map(|(code, status)| FaultRecord {
                code: code.clone(),
                status: *status,
                section: *section,
            })
        })
    }

    /// Returns the records currently failing.
    pub fn failing(&self) -> impl Iterator<Item = FaultRecord> + '_ {
        self.records().filter(|r| r.status == FaultStatus::Fail)
    }

    /// Returns the number of reported codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if no code was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Computes the transitions from `self` to `next`.
    ///
    /// Only codes whose failing state changed are reported. A code that is
    /// absent counts as not failing.
    #[must_use]
    pub fn diff(&self, next: &FaultSnapshot) -> FaultDiff {
        let mut keys: Vec<(FaultSection, &str)> = self
            .entries
            .iter()
            .chain(next.entries.iter())
            .flat_map(|(section, codes)| codes.keys().map(move |code| (*section, code.as_str())))
            .collect();
        keys.sort_unstable();
        keys.dedup();

        let transitions = keys
            .into_iter()
            .filter_map(|(section, code)| {
                let previous = self.status(section, code);
                let current = next.status(section, code);
                let was_failing = previous == Some(FaultStatus::Fail);
                let is_failing = current == Some(FaultStatus::Fail);
                (was_failing != is_failing).then(|| FaultTransition {
                    section,
                    code: code.to_string(),
                    previous,
                    current,
                })
            })
            .collect();

        FaultDiff { transitions }
    }
}

impl FromIterator<FaultRecord> for FaultSnapshot {
    fn from_iter<I: IntoIterator<Item = FaultRecord>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for record in iter {
            snapshot.insert(record.section, record.code, record.status);
        }
        snapshot
    }
}

/// A code whose failing state changed between two dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultTransition {
    /// Section of the code.
    pub section: FaultSection,
    /// The fault code.
    pub code: String,
    /// Status in the previous dump, `None` if absent.
    pub previous: Option<FaultStatus>,
    /// Status in the new dump, `None` if absent.
    pub current: Option<FaultStatus>,
}

impl FaultTransition {
    /// Returns `true` if the code started failing.
    #[must_use]
    pub fn is_newly_failing(&self) -> bool {
        self.current == Some(FaultStatus::Fail)
    }

    /// Returns `true` if the code stopped failing.
    #[must_use]
    pub fn is_recovered(&self) -> bool {
        !self.is_newly_failing()
    }
}

/// Transitions between two fault dumps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultDiff {
    transitions: Vec<FaultTransition>,
}

impl FaultDiff {
    /// Returns all transitions, ordered by section then code.
    #[must_use]
    pub fn transitions(&self) -> &[FaultTransition] {
        &self.transitions
    }

    /// Returns the codes that started failing.
    pub fn newly_failing(&self) -> impl Iterator<Item = &FaultTransition> {
        self.transitions.iter().filter(|t| t.is_newly_failing())
    }

    /// Returns the codes that stopped failing.
    pub fn recovered(&self) -> impl Iterator<Item = &FaultTransition> {
        self.transitions.iter().filter(|t| t.is_recovered())
    }

    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
