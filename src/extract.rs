//! Job workbook field extraction.
//!
//! Reads the fixed header cells and the tool table from a job sheet and
//! produces the records the record sink replicates. The pipeline only
//! depends on the [`ReadJob`] trait; the cell layout lives here.

use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use snafu::prelude::*;
use std::path::Path;

use crate::error::{ExtractError, MissingSheetSnafu, OpenWorkbookSnafu};

/// Program-level fields read from the job sheet's header block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramRecord {
    pub o_number: Option<String>,
    pub model_num: Option<String>,
    pub parts_name: Option<String>,
    pub goods_name: Option<String>,
    pub files_name: Option<String>,
    pub create_date: Option<String>,
    pub item_code: Option<String>,
    pub tools: Option<String>,
    pub creator: Option<String>,
    pub tooling: Option<String>,
    pub process_time: Option<String>,
    /// Output directory of the job; filled in by the dispatcher once the
    /// job's destination is prepared.
    pub folder_path: String,
}

/// One row of the job sheet's tool table.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRecord {
    pub tool_no: Option<String>,
    pub name: String,
}

/// Everything extracted from one job workbook.
#[derive(Debug, Clone, Default)]
pub struct JobRecords {
    pub program: ProgramRecord,
    pub tools: Vec<ToolRecord>,
}

/// Reads the records of one job workbook.
pub trait ReadJob: Send + Sync + 'static {
    fn read(&self, input: &Path) -> Result<JobRecords, ExtractError>;
}

/// Production reader for `.xlsx` job sheets.
pub struct WorkbookReader {
    sheet_name: String,
}

// Fixed header-cell positions of the job sheet, zero-based (row, column).
const O_NUMBER: (u32, u32) = (2, 2);
const MODEL_NUM: (u32, u32) = (3, 2);
const PARTS_NAME: (u32, u32) = (0, 7);
const GOODS_NAME: (u32, u32) = (1, 7);
const FILES_NAME: (u32, u32) = (2, 7);
const TOOLING: (u32, u32) = (3, 7);
const ITEM_CODE: (u32, u32) = (0, 12);
const TOOLS: (u32, u32) = (1, 12);
const PROCESS_TIME: (u32, u32) = (2, 12);
const CREATE_DATE: (u32, u32) = (0, 16);
const CREATOR: (u32, u32) = (1, 16);

// Tool table rows start below the header block and end at the first row
// without a tool name.
const TOOL_TABLE_START: u32 = 6;
const TOOL_NO_COL: u32 = 1;
const TOOL_NAME_COL: u32 = 2;

impl WorkbookReader {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
        }
    }
}

impl ReadJob for WorkbookReader {
    fn read(&self, input: &Path) -> Result<JobRecords, ExtractError> {
        let mut workbook: Xlsx<_> =
            open_workbook(input).context(OpenWorkbookSnafu { path: input })?;
        let range = workbook
            .worksheet_range(&self.sheet_name)
            .context(MissingSheetSnafu {
                sheet: &self.sheet_name,
                path: input,
            })?;
        Ok(read_range(&range))
    }
}

/// Extract records from an already-loaded sheet range.
pub fn read_range(range: &Range<Data>) -> JobRecords {
    let program = ProgramRecord {
        o_number: cell_text(range, O_NUMBER),
        model_num: cell_text(range, MODEL_NUM),
        parts_name: cell_text(range, PARTS_NAME),
        goods_name: cell_text(range, GOODS_NAME),
        files_name: cell_text(range, FILES_NAME),
        create_date: cell_text(range, CREATE_DATE),
        item_code: cell_text(range, ITEM_CODE),
        tools: cell_text(range, TOOLS),
        creator: cell_text(range, CREATOR),
        tooling: cell_text(range, TOOLING),
        process_time: cell_text(range, PROCESS_TIME),
        folder_path: String::new(),
    };

    let mut tools = Vec::new();
    let last_row = range.end().map(|(row, _)| row).unwrap_or(0);
    for row in TOOL_TABLE_START..=last_row {
        match cell_text(range, (row, TOOL_NAME_COL)) {
            Some(name) => tools.push(ToolRecord {
                tool_no: cell_text(range, (row, TOOL_NO_COL)),
                name,
            }),
            None => break,
        }
    }

    JobRecords { program, tools }
}

/// The category a tooling name belongs to: the text before the first `.`.
pub fn category_of(tooling: &str) -> &str {
    tooling.split('.').next().unwrap_or(tooling)
}

/// Non-empty trimmed text of a cell.
fn cell_text(range: &Range<Data>, pos: (u32, u32)) -> Option<String> {
    let value = range.get_value(pos)?;
    let text = match value {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) => s.trim().to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string().trim().to_string(),
    };
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> Range<Data> {
        let mut range = Range::new((0, 0), (9, 16));
        range.set_value(O_NUMBER, Data::String("O-4711".into()));
        range.set_value(MODEL_NUM, Data::String("MX-200".into()));
        range.set_value(PARTS_NAME, Data::String("bracket".into()));
        range.set_value(TOOLING, Data::String("MILL.A1".into()));
        range.set_value(ITEM_CODE, Data::Float(120034.0));
        range.set_value(CREATOR, Data::String("  yamada  ".into()));
        range.set_value((TOOL_TABLE_START, TOOL_NO_COL), Data::Float(1.0));
        range.set_value(
            (TOOL_TABLE_START, TOOL_NAME_COL),
            Data::String("endmill 6mm".into()),
        );
        range.set_value((TOOL_TABLE_START + 1, TOOL_NO_COL), Data::Float(2.0));
        range.set_value(
            (TOOL_TABLE_START + 1, TOOL_NAME_COL),
            Data::String("drill 3mm".into()),
        );
        range
    }

    #[test]
    fn test_header_cells_extracted() {
        let records = read_range(&sheet());
        let program = records.program;

        assert_eq!(program.o_number.as_deref(), Some("O-4711"));
        assert_eq!(program.model_num.as_deref(), Some("MX-200"));
        assert_eq!(program.parts_name.as_deref(), Some("bracket"));
        assert_eq!(program.tooling.as_deref(), Some("MILL.A1"));
        assert_eq!(program.item_code.as_deref(), Some("120034"));
        assert_eq!(program.creator.as_deref(), Some("yamada"), "cells are trimmed");
        assert_eq!(program.goods_name, None);
    }

    #[test]
    fn test_tool_table_stops_at_first_blank_name() {
        let records = read_range(&sheet());
        assert_eq!(records.tools.len(), 2);
        assert_eq!(records.tools[0].name, "endmill 6mm");
        assert_eq!(records.tools[0].tool_no.as_deref(), Some("1"));
        assert_eq!(records.tools[1].name, "drill 3mm");
    }

    #[test]
    fn test_empty_sheet_yields_empty_records() {
        let range: Range<Data> = Range::new((0, 0), (0, 0));
        let records = read_range(&range);
        assert_eq!(records.program.o_number, None);
        assert!(records.tools.is_empty());
    }

    #[test]
    fn test_category_of() {
        assert_eq!(category_of("MILL.A1"), "MILL");
        assert_eq!(category_of("LATHE"), "LATHE");
        assert_eq!(category_of("A.B.C"), "A");
    }
}
