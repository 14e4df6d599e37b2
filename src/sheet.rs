// src/sheet.rs
// Ranking sheet: column B holds member names, column C receives the newest event's ranks.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ScrapeError, SheetError};
use crate::model::Member;

pub const NAME_COL: usize = 2; // B
pub const RANK_COL: usize = 3; // C
const HEADER_ROWS: usize = 1;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// The cell-level operations the reconciliation needs. Rows and columns are 1-based.
pub trait Worksheet {
    /// Cells of `col` from row 1 down to the last non-empty one.
    fn col_values(&mut self, col: usize) -> Result<Vec<String>, SheetError>;
    /// Insert `values` as a new column before `col`; existing columns shift right.
    fn insert_column(&mut self, col: usize, values: &[String]) -> Result<(), SheetError>;
    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), SheetError>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub updated: usize,
    pub appended: usize,
}

/// Add a `第{n}回` column at C and fill in every member's rank.
/// Known names keep their row; new names are appended below the last one.
pub fn write_ranking<W: Worksheet>(
    sheet: &mut W,
    members: &[Member],
    event_number: u32,
) -> Result<WriteSummary, SheetError> {
    let mut names: Vec<String> = sheet
        .col_values(NAME_COL)?
        .into_iter()
        .skip(HEADER_ROWS)
        .map(|n| n.trim().to_string())
        .collect();

    let mut column = Vec::with_capacity(names.len() + 1);
    column.push(format!("第{event_number}回"));
    column.extend(std::iter::repeat(String::new()).take(names.len()));
    sheet.insert_column(RANK_COL, &column)?;
    tracing::info!("inserted column {}", column[0]);

    let mut summary = WriteSummary::default();
    for m in members {
        let name = m.name.trim();
        match names.iter().position(|n| n == name) {
            Some(i) => {
                sheet.update_cell(i + HEADER_ROWS + 1, RANK_COL, &m.rank)?;
                summary.updated += 1;
            }
            None => {
                let row = names.len() + HEADER_ROWS + 1;
                sheet.update_cell(row, NAME_COL, name)?;
                sheet.update_cell(row, RANK_COL, &m.rank)?;
                names.push(name.to_string());
                tracing::info!("new member {name} at row {row}");
                summary.appended += 1;
            }
        }
    }
    tracing::info!("wrote {} ranks ({} updated, {} new)", members.len(), summary.updated, summary.appended);
    Ok(summary)
}

/// Open the sheet and write the ranks. Without an event number the sheet is never opened.
pub fn publish_ranking<W, F>(event_number: Option<u32>, members: &[Member], open: F) -> anyhow::Result<WriteSummary>
where
    W: Worksheet,
    F: FnOnce() -> Result<W, SheetError>,
{
    let n = event_number
        .ok_or(ScrapeError::Missing("event number"))
        .context("not writing to the spreadsheet")?;
    let mut sheet = open().context("opening worksheet")?;
    write_ranking(&mut sheet, members, n).context("writing ranks")
}

/// 1 -> A, 26 -> Z, 27 -> AA.
pub fn column_letter(mut col: usize) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub fn spreadsheet_id(url: &str) -> Result<String, SheetError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)").expect("static regex"));
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SheetError::BadUrl(url.to_string()))
}

/// `'Sheet name'!B2:C2` with quotes doubled.
fn a1_range(sheet_name: &str, range: &str) -> String {
    format!("'{}'!{}", sheet_name.replace('\'', "''"), range)
}

/// `.../{id}/values/{range}` with the range percent-encoded as a single path segment.
fn values_url(spreadsheet_id: &str, sheet_name: &str, range: &str) -> Result<Url, SheetError> {
    let mut url = Url::parse(SHEETS_API).map_err(|e| SheetError::BadUrl(format!("{SHEETS_API}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| SheetError::BadUrl(SHEETS_API.to_string()))?
        .push(spreadsheet_id)
        .push("values")
        .push(&a1_range(sheet_name, range));
    Ok(url)
}

/// One tab of a Google spreadsheet, addressed through the Sheets v4 REST API.
pub struct GoogleSheet {
    http: Client,
    token: String,
    spreadsheet_id: String,
    sheet_name: String,
    sheet_id: i64,
}

#[derive(Deserialize)]
struct Metadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

impl GoogleSheet {
    /// Resolve `sheet_name` inside the spreadsheet at `url`. Fails on a bad token or unknown tab.
    pub fn open(url: &str, sheet_name: &str, token: &str) -> Result<Self, SheetError> {
        if token.trim().is_empty() {
            return Err(SheetError::Auth("no access token".into()));
        }
        let spreadsheet_id = spreadsheet_id(url)?;
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let meta_url = format!("{SHEETS_API}/{spreadsheet_id}?fields=sheets.properties(sheetId,title)");
        let meta: Metadata = check(http.get(meta_url).bearer_auth(token), url)?.json()?;
        let sheet_id = meta
            .sheets
            .iter()
            .find(|s| s.properties.title == sheet_name)
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| SheetError::NotFound(format!("worksheet '{sheet_name}' in {url}")))?;
        tracing::info!("opened worksheet {sheet_name}");

        Ok(Self {
            http,
            token: token.to_string(),
            spreadsheet_id,
            sheet_name: sheet_name.to_string(),
            sheet_id,
        })
    }

    fn values_url(&self, range: &str) -> Result<Url, SheetError> {
        values_url(&self.spreadsheet_id, &self.sheet_name, range)
    }

    fn put_values(&self, range: &str, values: Value) -> Result<(), SheetError> {
        let req = self
            .http
            .put(self.values_url(range)?)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(&self.token)
            .json(&json!({ "values": values }));
        check(req, &self.spreadsheet_id)?;
        Ok(())
    }
}

impl Worksheet for GoogleSheet {
    fn col_values(&mut self, col: usize) -> Result<Vec<String>, SheetError> {
        let letter = column_letter(col);
        let req = self
            .http
            .get(self.values_url(&format!("{letter}:{letter}"))?)
            .query(&[("majorDimension", "COLUMNS")])
            .bearer_auth(&self.token);
        let body: Value = check(req, &self.spreadsheet_id)?.json()?;
        Ok(first_column(&body))
    }

    fn insert_column(&mut self, col: usize, values: &[String]) -> Result<(), SheetError> {
        let idx = col - 1;
        let req = self
            .http
            .post(format!("{SHEETS_API}/{}:batchUpdate", self.spreadsheet_id))
            .bearer_auth(&self.token)
            .json(&json!({
                "requests": [{
                    "insertDimension": {
                        "range": {
                            "sheetId": self.sheet_id,
                            "dimension": "COLUMNS",
                            "startIndex": idx,
                            "endIndex": idx + 1
                        },
                        "inheritFromBefore": false
                    }
                }]
            }));
        check(req, &self.spreadsheet_id)?;

        let letter = column_letter(col);
        let range = format!("{letter}1:{letter}{}", values.len().max(1));
        let rows: Vec<Value> = values.iter().map(|v| json!([v])).collect();
        self.put_values(&range, Value::Array(rows))
    }

    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), SheetError> {
        let cell = format!("{}{}", column_letter(col), row);
        self.put_values(&cell, json!([[value]]))
    }
}

/// Send and map auth/404/other failures.
fn check(req: RequestBuilder, what: &str) -> Result<Response, SheetError> {
    let resp = req.send()?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SheetError::Auth(format!("{status}: {body}")),
        StatusCode::NOT_FOUND => SheetError::NotFound(what.to_string()),
        _ => SheetError::Api { status: status.as_u16(), body },
    })
}

/// `values[0]` of a COLUMNS-major ValueRange, as strings.
fn first_column(body: &Value) -> Vec<String> {
    body.get("values")
        .and_then(Value::as_array)
        .and_then(|cols| cols.first())
        .and_then(Value::as_array)
        .map(|cells| {
            cells
                .iter()
                .map(|c| match c {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Grid held in memory: rows of cells, ragged.
    #[derive(Default)]
    struct MemorySheet {
        rows: Vec<Vec<String>>,
    }

    impl MemorySheet {
        fn from_rows(rows: &[&[&str]]) -> Self {
            Self { rows: rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect() }
        }

        fn cell(&self, row: usize, col: usize) -> &str {
            self.rows
                .get(row - 1)
                .and_then(|r| r.get(col - 1))
                .map(String::as_str)
                .unwrap_or("")
        }
    }

    impl Worksheet for MemorySheet {
        fn col_values(&mut self, col: usize) -> Result<Vec<String>, SheetError> {
            let mut out: Vec<String> = self.rows.iter().map(|r| r.get(col - 1).cloned().unwrap_or_default()).collect();
            while out.last().is_some_and(|c| c.is_empty()) {
                out.pop();
            }
            Ok(out)
        }

        fn insert_column(&mut self, col: usize, values: &[String]) -> Result<(), SheetError> {
            let height = self.rows.len().max(values.len());
            self.rows.resize_with(height, Vec::new);
            for (i, row) in self.rows.iter_mut().enumerate() {
                if row.len() < col - 1 {
                    row.resize(col - 1, String::new());
                }
                row.insert(col - 1, values.get(i).cloned().unwrap_or_default());
            }
            Ok(())
        }

        fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), SheetError> {
            if self.rows.len() < row {
                self.rows.resize_with(row, Vec::new);
            }
            let r = &mut self.rows[row - 1];
            if r.len() < col {
                r.resize(col, String::new());
            }
            r[col - 1] = value.to_string();
            Ok(())
        }
    }

    fn roster() -> MemorySheet {
        MemorySheet::from_rows(&[
            &["#", "名前", "第77回"],
            &["1", "Alice", "3"],
            &["2", " Bob ", "10"],
        ])
    }

    #[test]
    fn existing_names_update_their_row() {
        let mut sheet = roster();
        let members = [Member::new("Bob", "7"), Member::new("Alice", "1")];
        let summary = write_ranking(&mut sheet, &members, 78).unwrap();

        assert_eq!(summary, WriteSummary { updated: 2, appended: 0 });
        assert_eq!(sheet.cell(1, 3), "第78回");
        assert_eq!(sheet.cell(2, 3), "1");
        assert_eq!(sheet.cell(3, 3), "7");
        // previous event shifted right
        assert_eq!(sheet.cell(1, 4), "第77回");
        assert_eq!(sheet.cell(3, 4), "10");
    }

    #[test]
    fn new_names_are_appended_with_blank_leading_columns() {
        let mut sheet = roster();
        let members = [Member::new("Carol", "5"), Member::new("Alice", "2")];
        let summary = write_ranking(&mut sheet, &members, 78).unwrap();

        assert_eq!(summary, WriteSummary { updated: 1, appended: 1 });
        assert_eq!(sheet.cell(4, 1), "");
        assert_eq!(sheet.cell(4, 2), "Carol");
        assert_eq!(sheet.cell(4, 3), "5");
        assert_eq!(sheet.cell(4, 4), "");
        assert_eq!(sheet.cell(2, 3), "2");
        // Bob did not rank this time
        assert_eq!(sheet.cell(3, 3), "");
    }

    #[test]
    fn repeated_new_name_reuses_appended_row() {
        let mut sheet = roster();
        let members = [Member::new("Dan", "4"), Member::new("Dan", "6")];
        let summary = write_ranking(&mut sheet, &members, 78).unwrap();
        assert_eq!(summary, WriteSummary { updated: 1, appended: 1 });
        assert_eq!(sheet.cell(4, 3), "6");
        assert_eq!(sheet.cell(5, 2), "");
    }

    #[test]
    fn empty_sheet_gets_header_and_rows() {
        let mut sheet = MemorySheet::default();
        write_ranking(&mut sheet, &[Member::new("Eve", "1")], 1).unwrap();
        assert_eq!(sheet.cell(1, 3), "第1回");
        assert_eq!(sheet.cell(2, 2), "Eve");
        assert_eq!(sheet.cell(2, 3), "1");
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(3), "C");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn spreadsheet_id_from_url() {
        let url = "https://docs.google.com/spreadsheets/d/1AbC-d_EF/edit#gid=0";
        assert_eq!(spreadsheet_id(url).unwrap(), "1AbC-d_EF");
        assert!(matches!(spreadsheet_id("https://example.com/x"), Err(SheetError::BadUrl(_))));
    }

    #[test]
    fn a1_ranges_quote_sheet_names() {
        assert_eq!(a1_range("団員管理", "B:B"), "'団員管理'!B:B");
        assert_eq!(a1_range("Bob's", "C2"), "'Bob''s'!C2");
    }

    fn percent_decode(s: &str) -> String {
        let b = s.as_bytes();
        let mut out = Vec::with_capacity(b.len());
        let mut i = 0;
        while i < b.len() {
            if b[i] == b'%' && i + 2 < b.len() {
                out.push(u8::from_str_radix(&s[i + 1..i + 3], 16).unwrap());
                i += 3;
            } else {
                out.push(b[i]);
                i += 1;
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn values_url_keeps_sheet_name_in_one_segment() {
        for name in ["Ranks #2", "a/b?c", "団員管理", "Bob's"] {
            let url = values_url("abc", name, "B:B").unwrap();
            assert_eq!(url.fragment(), None, "{name}");
            assert_eq!(url.query(), None, "{name}");

            let reparsed = Url::parse(url.as_str()).unwrap();
            let segments: Vec<&str> = reparsed.path_segments().unwrap().collect();
            assert_eq!(segments.len(), 5, "{name}: {segments:?}");
            assert_eq!(&segments[..4], ["v4", "spreadsheets", "abc", "values"]);
            assert_eq!(percent_decode(segments[4]), a1_range(name, "B:B"));
        }
    }

    #[test]
    fn missing_event_number_never_opens_the_sheet() {
        let mut opened = false;
        let err = publish_ranking(None, &[Member::new("Alice", "1")], || {
            opened = true;
            Ok(roster())
        })
        .unwrap_err();
        assert!(!opened);
        assert!(format!("{err:#}").contains("event number"));
    }

    #[test]
    fn publish_writes_once_event_number_is_known() {
        let mut sheet = Some(roster());
        let summary = publish_ranking(Some(78), &[Member::new("Alice", "1")], || Ok(sheet.take().unwrap())).unwrap();
        assert_eq!(summary, WriteSummary { updated: 1, appended: 0 });
    }

    #[test]
    fn publish_surfaces_open_failures() {
        let err = publish_ranking::<MemorySheet, _>(Some(78), &[], || Err(SheetError::Auth("no access token".into())))
            .unwrap_err();
        assert!(format!("{err:#}").contains("authentication failed"));
    }

    #[test]
    fn column_values_parse_from_value_range() {
        let body = json!({ "range": "'x'!B1:B3", "majorDimension": "COLUMNS", "values": [["名前", "Alice", 3]] });
        assert_eq!(first_column(&body), ["名前", "Alice", "3"]);
        assert!(first_column(&json!({ "range": "'x'!B1:B1" })).is_empty());
    }
}
