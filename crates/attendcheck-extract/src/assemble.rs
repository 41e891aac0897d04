// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Record assembler — turns classified rows into `StudentInfo` records.

use attendcheck_core::error::{AttendCheckError, Result};
use attendcheck_core::types::{ClassifiedToken, FieldRole, NameJoin, StudentInfo, join_full_name};
use tracing::{debug, trace};

use crate::classify::RowCluster;

/// Build one record per entry row, top to bottom.
///
/// Non-entry rows are skipped silently. When the same ID appears twice in one
/// file the upper row wins.
pub fn assemble(rows: &[RowCluster], file_name: &str, join: NameJoin) -> Vec<StudentInfo> {
    let mut students: Vec<StudentInfo> = Vec::new();
    for row in rows {
        let student = match assemble_row(row, file_name, join) {
            Ok(student) => student,
            Err(err) => {
                trace!(error = %err, "row skipped");
                continue;
            }
        };
        if students
            .iter()
            .any(|s| s.student_id_num == student.student_id_num)
        {
            debug!(id = %student.student_id_num, file = file_name, "duplicate ID in file dropped");
            continue;
        }
        students.push(student);
    }
    students
}

/// Build the record for a single row.
///
/// Confidence is the minimum over the ID token and every token that
/// contributed to a non-empty surname or given name.
pub fn assemble_row(row: &RowCluster, file_name: &str, join: NameJoin) -> Result<StudentInfo> {
    let RowCluster::Entry { tokens, .. } = row else {
        return Err(AttendCheckError::UnresolvableRecord(format!(
            "row at y={} has no student ID",
            row.band().y0
        )));
    };

    let id = tokens
        .iter()
        .find(|t| t.role.is_id())
        .ok_or_else(|| AttendCheckError::UnresolvableRecord("entry row lost its ID".into()))?;

    let surname = join_role(tokens, FieldRole::Surname, join);
    let name = join_role(tokens, FieldRole::GivenName, join);

    let confidence = tokens
        .iter()
        .filter(|t| t.role.is_name() && !t.value.is_empty())
        .map(ClassifiedToken::confidence)
        .fold(id.confidence(), f32::min);

    Ok(StudentInfo::new(
        id.value.clone(),
        surname,
        name,
        join,
        confidence,
        file_name,
    ))
}

/// Values of every token with `role`, left to right, joined like a full name.
fn join_role(tokens: &[ClassifiedToken], role: FieldRole, join: NameJoin) -> String {
    tokens
        .iter()
        .filter(|t| t.role == role)
        .fold(String::new(), |acc, t| join_full_name(&acc, &t.value, join))
}
