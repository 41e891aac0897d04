// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CSV exporter — the attendance list's on-the-wire layout.
//
// Layout: header `student_id_num,surname,name,full_name,confidence,file_name`,
// one row per record in input order, confidence with two decimals, RFC 4180
// quoting, optional UTF-8 byte order mark.

use std::collections::HashSet;
use std::path::Path;

use attendcheck_core::config::ExportOptions;
use attendcheck_core::error::{AttendCheckError, Result};
use attendcheck_core::types::StudentInfo;
use tracing::{debug, instrument};

/// Content type for a CSV download.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Suggested download name for the merged list.
pub const DEFAULT_EXPORT_FILENAME: &str = "attendance_list.csv";

/// Suffix of per-file exports: `sheet-3.png` → `sheet-3_result.csv`.
pub const SPLIT_SUFFIX: &str = "_result.csv";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const HEADER: [&str; 6] = [
    "student_id_num",
    "surname",
    "name",
    "full_name",
    "confidence",
    "file_name",
];

/// Serialize `students` into one CSV buffer.
#[instrument(skip_all, fields(records = students.len(), bom = options.bom))]
pub fn export_csv(students: &[StudentInfo], options: &ExportOptions) -> Result<Vec<u8>> {
    write_table(students, options, true)
}

/// One CSV per source file, in order of each file's first record.
///
/// Returns `(file name, bytes)` pairs. The `file_name` column is left out
/// since the file itself carries it. Files that would share a name get a
/// numeric suffix.
#[instrument(skip_all, fields(records = students.len()))]
pub fn export_split(
    students: &[StudentInfo],
    options: &ExportOptions,
) -> Result<Vec<(String, Vec<u8>)>> {
    let mut groups: Vec<(&str, Vec<StudentInfo>)> = Vec::new();
    for student in students {
        match groups.iter_mut().find(|(name, _)| *name == student.file_name) {
            Some((_, group)) => group.push(student.clone()),
            None => groups.push((student.file_name.as_str(), vec![student.clone()])),
        }
    }

    let mut used: HashSet<String> = HashSet::new();
    let mut outputs = Vec::with_capacity(groups.len());
    for (source, group) in groups {
        let stem = Path::new(source)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unnamed".to_owned());
        let mut name = format!("{stem}{SPLIT_SUFFIX}");
        let mut n = 2;
        while !used.insert(name.clone()) {
            name = format!("{stem}_{n}{SPLIT_SUFFIX}");
            n += 1;
        }
        debug!(source, output = %name, records = group.len(), "split export");
        outputs.push((name, write_table(&group, options, false)?));
    }
    Ok(outputs)
}

fn write_table(
    students: &[StudentInfo],
    options: &ExportOptions,
    with_file_name: bool,
) -> Result<Vec<u8>> {
    let columns = if with_file_name {
        &HEADER[..]
    } else {
        &HEADER[..HEADER.len() - 1]
    };

    let mut buffer = Vec::new();
    if options.bom {
        buffer.extend_from_slice(UTF8_BOM);
    }

    let mut writer = csv::Writer::from_writer(buffer);
    writer.write_record(columns).map_err(csv_error)?;
    for s in students {
        let confidence = format!("{:.2}", s.confidence);
        let row = [
            s.student_id_num.as_str(),
            s.surname.as_str(),
            s.name.as_str(),
            s.full_name.as_str(),
            confidence.as_str(),
            s.file_name.as_str(),
        ];
        writer
            .write_record(&row[..columns.len()])
            .map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| AttendCheckError::Export(format!("flush: {e}")))
}

fn csv_error(err: csv::Error) -> AttendCheckError {
    AttendCheckError::Export(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendcheck_core::types::NameJoin;

    fn student(id: &str, surname: &str, name: &str, confidence: f32, file: &str) -> StudentInfo {
        StudentInfo::new(id, surname, name, NameJoin::Auto, confidence, file)
    }

    fn read_back(bytes: &[u8]) -> Vec<Vec<String>> {
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(body)
            .records()
            .map(|r| r.expect("record").iter().map(str::to_owned).collect())
            .collect()
    }

    #[test]
    fn header_and_rows_in_input_order() {
        let students = vec![
            student("20231234", "Yamada", "Taro", 0.9, "a.png"),
            student("20231235", "Sato", "Hanako", 0.456, "b.png"),
        ];
        let bytes = export_csv(&students, &ExportOptions { bom: false }).expect("csv");
        let text = String::from_utf8(bytes).expect("utf-8");
        assert_eq!(
            text,
            "student_id_num,surname,name,full_name,confidence,file_name\n\
             20231234,Yamada,Taro,Yamada Taro,0.90,a.png\n\
             20231235,Sato,Hanako,Sato Hanako,0.46,b.png\n"
        );
    }

    #[test]
    fn bom_is_on_by_default() {
        let bytes = export_csv(&[], &ExportOptions::default()).expect("csv");
        assert!(bytes.starts_with(UTF8_BOM));
        assert_eq!(read_back(&bytes), vec![HEADER.map(str::to_owned).to_vec()]);
    }

    #[test]
    fn empty_fields_are_empty_cells() {
        let students = vec![student("abc-1234567", "", "", 0.8, "a.png")];
        let bytes = export_csv(&students, &ExportOptions { bom: false }).expect("csv");
        let text = String::from_utf8(bytes).expect("utf-8");
        assert!(text.ends_with("1234567,,,,0.80,a.png\n"));
        assert!(!text.contains("null"));
    }

    #[test]
    fn round_trip_ascii_and_cjk() {
        let students = vec![
            student("20231234", "Yamada", "Taro", 0.9, "sheet 1.png"),
            student("20231235", "山田", "太郎", 0.75, "出席簿.jpg"),
            student("20231236", "O'Brien, Jr.", "Mary \"May\"", 1.0, "a,b.png"),
        ];
        let bytes = export_csv(&students, &ExportOptions::default()).expect("csv");
        let rows = read_back(&bytes);
        assert_eq!(rows.len(), students.len() + 1);
        for (row, s) in rows[1..].iter().zip(&students) {
            assert_eq!(row[0], s.student_id_num);
            assert_eq!(row[1], s.surname);
            assert_eq!(row[2], s.name);
            assert_eq!(row[3], s.full_name);
            assert_eq!(row[4], format!("{:.2}", s.confidence));
            assert_eq!(row[5], s.file_name);
        }
        assert_eq!(rows[2][3], "山田太郎");
    }

    #[test]
    fn split_groups_by_file_in_first_appearance_order() {
        let students = vec![
            student("20231234", "Yamada", "Taro", 0.9, "scans/b.png"),
            student("20231235", "Sato", "Hanako", 0.8, "a.jpg"),
            student("20231236", "Suzuki", "Ichiro", 0.7, "scans/b.png"),
        ];
        let files = export_split(&students, &ExportOptions { bom: false }).expect("split");
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b_result.csv", "a_result.csv"]);

        let rows = read_back(&files[0].1);
        assert_eq!(rows[0], HEADER[..5].iter().map(|s| s.to_string()).collect::<Vec<_>>());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][0], "20231234");
        assert_eq!(rows[2][0], "20231236");
        assert!(rows.iter().all(|r| r.len() == 5));
    }

    #[test]
    fn split_names_never_collide() {
        let students = vec![
            student("20231234", "Yamada", "Taro", 0.9, "a.png"),
            student("20231235", "Sato", "Hanako", 0.8, "a.jpg"),
        ];
        let files = export_split(&students, &ExportOptions::default()).expect("split");
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a_result.csv", "a_2_result.csv"]);
    }
}
