use lms_portal::csv::{self, CsvWriter, Header, escape_field};

#[test]
fn test_parse_plain_rows_with_line_numbers() {
    let records = csv::parse("name,email\nAda,ada@x.io\n\nBob,bob@x.io\n");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].fields, vec!["name", "email"]);
    assert_eq!(records[1].line, 2);
    // The blank line 3 is skipped but still counted.
    assert_eq!(records[2].line, 4);
    assert_eq!(records[2].get(0), "Bob");
}

#[test]
fn test_parse_quoted_fields() {
    let text = "prompt,options\r\n\"Pick one, please\",\"a|\"\"b\"\"\"\r\n\"multi\nline\",x\r\n";
    let records = csv::parse(text);
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].fields, vec!["Pick one, please", "a|\"b\""]);
    assert_eq!(records[2].fields[0], "multi\nline");
    assert_eq!(records[2].line, 3);
}

#[test]
fn test_parse_strips_bom_and_handles_missing_trailing_newline() {
    let records = csv::parse("\u{feff}name,email\nAda,ada@x.io");
    assert_eq!(records[0].fields[0], "name");
    assert_eq!(records[1].fields, vec!["Ada", "ada@x.io"]);
}

#[test]
fn test_header_lookup_is_case_insensitive() {
    let records = csv::parse(" Name ,EMAIL,Role\nAda,ada@x.io\n");
    let header = Header::new(&records[0]);
    assert_eq!(header.index("name"), Some(0));
    assert_eq!(header.field(&records[1], "email"), "ada@x.io");
    // Short rows read as empty.
    assert_eq!(header.field(&records[1], "role"), "");
    assert_eq!(header.field(&records[1], "team"), "");
    assert_eq!(header.missing(&["name", "password", "email"]), vec!["password"]);
}

#[test]
fn test_escape_field() {
    assert_eq!(escape_field("plain"), "plain");
    assert_eq!(escape_field("a,b"), "\"a,b\"");
    assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
}

#[test]
fn test_writer_output_parses_back() {
    let mut writer = CsvWriter::with_header(&["id", "comment"]);
    writer.row(&["1", "fine, thanks"]);
    writer.row(&["2".to_string(), "\"quoted\"".to_string()]);
    let out = writer.finish();

    assert!(out.starts_with("id,comment\r\n"));
    let records = csv::parse(&out);
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].fields, vec!["1", "fine, thanks"]);
    assert_eq!(records[2].fields, vec!["2", "\"quoted\""]);
}
