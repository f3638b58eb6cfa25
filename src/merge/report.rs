// src/merge/report.rs

use std::fmt::Write as _;

use crate::merge::result::MergedResult;
use crate::merge::validate::validate;

const RULE: &str = "======================================================================";

impl MergedResult {
    /// Human-readable report: summary, participants, conflicts and
    /// validation issues.
    pub fn render_report(&self) -> String {
        let issues = validate(self);
        let mut out = String::new();

        // Writing to a String cannot fail.
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "MERGE REPORT - {}", self.cohort_id);
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "Merged at:            {}", self.merged_at.to_rfc3339());
        let _ = writeln!(out, "Participants:         {}", self.participants.len());
        let _ = writeln!(out, "Failed members:       {}", self.failed.len());
        let _ = writeln!(out, "Abandoned members:    {}", self.abandoned.len());
        let _ = writeln!(out, "Total conflicts:      {}", self.conflicts.len());
        let _ = writeln!(out, "Resolved conflicts:   {}", self.resolved_conflicts());
        let _ = writeln!(out, "Unresolved conflicts: {}", self.unresolved_conflicts());
        let _ = writeln!(out, "Validation issues:    {}", issues.len());

        if !self.participants.is_empty() {
            let _ = writeln!(out, "\nParticipants: {}", self.participants.join(", "));
        }
        if !self.failed.is_empty() {
            let _ = writeln!(out, "Failed: {}", self.failed.join(", "));
        }
        if !self.abandoned.is_empty() {
            let _ = writeln!(out, "Abandoned: {}", self.abandoned.join(", "));
        }

        let keys: Vec<&str> = self.data.keys().map(String::as_str).collect();
        let _ = writeln!(out, "Result keys: [{}]", keys.join(", "));

        if !self.conflicts.is_empty() {
            let _ = writeln!(out, "\n{RULE}\nCONFLICTS\n{RULE}");
            for conflict in &self.conflicts {
                let _ = writeln!(out, "[#{}] {}", conflict.id, conflict.category.as_str());
                let _ = writeln!(out, "  Sources:    {}", conflict.participants.join(", "));
                let _ = writeln!(out, "  Detail:     {}", conflict.detail);
                let _ = writeln!(
                    out,
                    "  Resolution: {}",
                    conflict.resolution.as_deref().unwrap_or("PENDING")
                );
            }
        }

        if !issues.is_empty() {
            let _ = writeln!(out, "\n{RULE}\nVALIDATION ISSUES\n{RULE}");
            for issue in &issues {
                let _ = writeln!(out, "  - {issue}");
            }
        }

        out
    }
}
