//! Parser for the schema-less line protocol.
//!
//! A line has the shape
//!
//! ```text
//! measurement[,tag=literal]* field=literal[,field=literal]* timestamp
//! ```
//!
//! Tag and field values are typed literals; the suffix or quoting of each literal selects
//! its [`ScalarType`](schemaless_types::column::ScalarType) through the table in [`infer`].
//! The timestamp is returned as its raw token and resolved against the destination's
//! precision by [`timestamp`].
//!
//! Like the InfluxDB parser this is built from nom combinators, with the escaping rules of
//! the InfluxDB line protocol for measurement names and keys.

use fmt::Display;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    combinator::map,
    sequence::separated_pair,
};
use schemaless_types::column::ScalarType;
use smallvec::SmallVec;
use snafu::Snafu;
use std::cmp::Ordering;
use std::{fmt, ops::Deref};
use tracing::debug;

pub mod infer;
pub mod timestamp;

pub use infer::Literal;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Line does not start with a measurement name"))]
    MeasurementMissing,

    #[snafu(display(r#"Must not contain duplicate tags, but "{tag_key}" was repeated"#))]
    DuplicateTag { tag_key: String },

    #[snafu(display(r#"Must not contain duplicate fields, but "{field_key}" was repeated"#))]
    DuplicateField { field_key: String },

    #[snafu(display("Could not parse tag set at '{content}'"))]
    TagSetInvalid { content: String },

    #[snafu(display(r#"No fields were provided"#))]
    FieldSetMissing,

    #[snafu(display("Could not parse field set at '{content}'"))]
    FieldSetInvalid { content: String },

    #[snafu(display(r#"No timestamp was provided"#))]
    TimestampMissing,

    #[snafu(display("String literal {content} is not terminated"))]
    UnterminatedString { content: String },

    #[snafu(display("'{value}' does not match any literal form"))]
    LiteralInvalid { value: String },

    #[snafu(display("'{value}' is out of range for {scalar_type}"))]
    LiteralOutOfRange {
        value: String,
        scalar_type: ScalarType,
    },

    #[snafu(display(r#"Measurements, tag keys and field keys may not end with a backslash"#))]
    EndsWithBackslash,

    #[snafu(display(
        "Could not parse entire line. Found trailing content: '{}'",
        trailing_content
    ))]
    CannotParseEntireLine { trailing_content: String },

    #[snafu(display(r#"A generic parsing error occurred: {:?}"#, kind))]
    GenericParsingError {
        kind: nom::error::ErrorKind,
        trace: Vec<Error>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
type IResult<I, T, E = Error> = nom::IResult<I, T, E>;

impl nom::error::ParseError<&str> for Error {
    fn from_error_kind(_input: &str, kind: nom::error::ErrorKind) -> Self {
        Self::GenericParsingError {
            kind,
            trace: vec![],
        }
    }

    fn append(_input: &str, kind: nom::error::ErrorKind, other: Self) -> Self {
        Self::GenericParsingError {
            kind,
            trace: vec![other],
        }
    }
}

/// Represents a single parsed line.
///
/// ```
/// use schemaless_line_protocol::{parse_line, Literal};
///
/// let line = parse_line(r#"st,t1=3i,t3="t3" c1=3i,c3=L"passit" 1626006833639000000"#).unwrap();
///
/// assert_eq!(line.series.measurement, "st");
/// let tags = line.series.tag_set.as_ref().unwrap();
/// assert_eq!(tags[0].0, "t1");
/// assert_eq!(tags[0].1, Literal::Int(3));
/// assert_eq!(line.field_set[1].0, "c3");
/// assert_eq!(line.field_set[1].1, Literal::NChar("passit".into()));
/// assert_eq!(line.timestamp, "1626006833639000000");
/// ```
#[derive(Debug)]
pub struct ParsedLine<'a> {
    pub series: Series<'a>,
    pub field_set: FieldSet<'a>,
    /// The unparsed timestamp token, see [`timestamp::TimestampToken`].
    pub timestamp: &'a str,
}

impl<'a> ParsedLine<'a> {
    /// Total number of columns on this line, including tags, fields and the timestamp.
    pub fn column_count(&self) -> usize {
        1 + self.field_set.len() + self.series.tag_set.as_ref().map_or(0, |t| t.len())
    }

    /// Returns the value of the passed in tag, if present.
    pub fn tag_value(&self, tag_key: &str) -> Option<&Literal<'a>> {
        self.series
            .tag_set
            .as_ref()
            .and_then(|t| t.iter().find(|(k, _)| *k == tag_key))
            .map(|(_, val)| val)
    }

    /// Returns the value of the passed in field, if present.
    pub fn field_value(&self, field_key: &str) -> Option<&Literal<'a>> {
        self.field_set
            .iter()
            .find(|(f, _)| *f == field_key)
            .map(|(_, val)| val)
    }
}

/// Converts a ParsedLine back to line protocol
impl Display for ParsedLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.series)?;

        let mut first = true;
        for (field_name, field_value) in &self.field_set {
            f.write_str(if first { " " } else { "," })?;
            first = false;
            escape_and_write_value(f, field_name.as_str(), KEY_DELIMITERS)?;
            write!(f, "={field_value}")?;
        }

        write!(f, " {}", self.timestamp)
    }
}

/// Represents the identifier of a series (measurement and tag set) of a line.
#[derive(Debug)]
pub struct Series<'a> {
    raw_input: &'a str,
    pub measurement: EscapedStr<'a>,
    pub tag_set: Option<TagSet<'a>>,
}

impl<'a> Series<'a> {
    /// The series exactly as it appeared in the input.
    pub fn raw_input(&self) -> &'a str {
        self.raw_input
    }
}

impl Display for Series<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        escape_and_write_value(f, self.measurement.as_str(), MEASUREMENT_DELIMITERS)?;
        if let Some(tag_set) = &self.tag_set {
            for (tag_name, tag_value) in tag_set {
                f.write_str(",")?;
                escape_and_write_value(f, tag_name.as_str(), KEY_DELIMITERS)?;
                write!(f, "={tag_value}")?;
            }
        }
        Ok(())
    }
}

pub type FieldSet<'a> = SmallVec<[(EscapedStr<'a>, Literal<'a>); 8]>;
pub type TagSet<'a> = SmallVec<[(EscapedStr<'a>, Literal<'a>); 8]>;

/// Represents single logical string in the input.
///
/// The input may be escaped, in which case the logical string is not a contiguous slice of
/// the input and is copied out; the common unescaped case borrows.
#[derive(Debug, Clone, Eq, Hash)]
pub enum EscapedStr<'a> {
    SingleSlice(&'a str),
    CopiedValue(String),
}

impl fmt::Display for EscapedStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'a> EscapedStr<'a> {
    fn from_slices(v: &[&'a str]) -> EscapedStr<'a> {
        match v.len() {
            0 => EscapedStr::SingleSlice(""),
            1 => EscapedStr::SingleSlice(v[0]),
            _ => EscapedStr::CopiedValue(v.join("")),
        }
    }

    pub fn is_escaped(&self) -> bool {
        matches!(self, EscapedStr::CopiedValue(_))
    }

    /// Return the logical representation as a single slice, which may not point into the
    /// original buffer.
    pub fn as_str(&self) -> &str {
        self
    }
}

impl Deref for EscapedStr<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        match &self {
            EscapedStr::SingleSlice(s) => s,
            EscapedStr::CopiedValue(s) => s,
        }
    }
}

impl PartialEq for EscapedStr<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl PartialOrd for EscapedStr<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EscapedStr<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl<'a> From<&'a str> for EscapedStr<'a> {
    fn from(other: &'a str) -> Self {
        EscapedStr::SingleSlice(other)
    }
}

impl From<EscapedStr<'_>> for String {
    fn from(other: EscapedStr<'_>) -> Self {
        match other {
            EscapedStr::SingleSlice(s) => s.into(),
            EscapedStr::CopiedValue(s) => s,
        }
    }
}

impl From<&EscapedStr<'_>> for String {
    fn from(other: &EscapedStr<'_>) -> Self {
        other.to_string()
    }
}

impl PartialEq<&str> for EscapedStr<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<String> for EscapedStr<'_> {
    fn eq(&self, other: &String) -> bool {
        self.as_str() == other
    }
}

/// Parse a single line. Leading whitespace is ignored; an empty line is an error.
pub fn parse_line(input: &str) -> Result<ParsedLine<'_>> {
    let i = input.trim_start_matches(is_whitespace_boundary_char);
    let res = match line(i) {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e),
        Err(nom::Err::Incomplete(_)) => unreachable!("Cannot have incomplete data"), // Only streaming parsers have this
    };

    if let Err(e) = &res {
        debug!("Error parsing line: '{}'. Error was {:?}", input, e);
    }
    res
}

/// Parse newline delimited input, skipping blank lines and `#` comments.
pub fn parse_lines(input: &str) -> impl Iterator<Item = Result<ParsedLine<'_>>> {
    split_lines(input).filter_map(|line| {
        if is_blank_or_comment(line) {
            None
        } else {
            Some(parse_line(line))
        }
    })
}

/// True for lines that carry no record.
pub fn is_blank_or_comment(line: &str) -> bool {
    let i = line.trim_start_matches(|c| is_whitespace_boundary_char(c) || c == '\r');
    i.is_empty() || i.starts_with('#')
}

/// Split `input` into individual lines to be parsed.
///
/// A newline only ends a line outside of a quoted value, so string literals in tags
/// and fields may contain newlines.
pub fn split_lines(input: &str) -> impl Iterator<Item = &str> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Plain,
        // just after an unescaped '=', where a quote opens a string
        ValueStart,
        // just after `L` at the start of a value
        NcharPrefix,
        Quoted,
    }

    let mut state = State::Plain;
    let mut in_escape = false;
    input.split(move |c: char| {
        // skip past escaped characters
        if in_escape {
            in_escape = false;
            return false;
        }
        if c == '\\' {
            in_escape = true;
            if state != State::Quoted {
                state = State::Plain;
            }
            return false;
        }

        match (state, c) {
            (State::Quoted, '"') => state = State::Plain,
            (State::Quoted, _) => {}
            (State::ValueStart | State::NcharPrefix, '"') => state = State::Quoted,
            (State::ValueStart, 'L') => state = State::NcharPrefix,
            (_, '=') => state = State::ValueStart,
            (_, '\n') => {
                state = State::Plain;
                return true;
            }
            _ => state = State::Plain,
        }
        false
    })
}

fn line(i: &str) -> IResult<&str, ParsedLine<'_>> {
    let (i, series) = series(i)?;

    if i.trim_start_matches(' ').is_empty() {
        return Err(nom::Err::Failure(Error::FieldSetMissing));
    }
    let (i, _) = whitespace(i).map_err(|_| trailing(i))?;
    let (i, field_set) = field_set(i)?;

    let rest = i.trim_start_matches(' ');
    if rest.trim_end_matches(is_line_end_char).is_empty() {
        return Err(nom::Err::Failure(Error::TimestampMissing));
    }
    if rest.len() == i.len() {
        return Err(trailing(i));
    }

    let end = rest.find(is_line_end_char).unwrap_or(rest.len());
    let (timestamp, remaining) = rest.split_at(end);
    if !remaining.trim_start_matches(is_line_end_char).is_empty() {
        return Err(trailing(remaining));
    }

    let line = ParsedLine {
        series,
        field_set,
        timestamp,
    };
    check_unique_keys(&line).map_err(nom::Err::Failure)?;

    Ok(("", line))
}

fn check_unique_keys(line: &ParsedLine<'_>) -> Result<()> {
    if let Some(tag_set) = &line.series.tag_set {
        for (idx, (key, _)) in tag_set.iter().enumerate() {
            if tag_set[..idx].iter().any(|(k, _)| k == key) {
                return Err(Error::DuplicateTag {
                    tag_key: key.to_string(),
                });
            }
        }
    }
    for (idx, (key, _)) in line.field_set.iter().enumerate() {
        if line.field_set[..idx].iter().any(|(k, _)| k == key) {
            return Err(Error::DuplicateField {
                field_key: key.to_string(),
            });
        }
    }
    Ok(())
}

fn trailing(i: &str) -> nom::Err<Error> {
    nom::Err::Failure(Error::CannotParseEntireLine {
        trailing_content: i.to_string(),
    })
}

fn series(i: &str) -> IResult<&str, Series<'_>> {
    let (mut rest, measurement) = match measurement(i) {
        Ok(v) => v,
        Err(nom::Err::Error(_)) => return Err(nom::Err::Failure(Error::MeasurementMissing)),
        Err(e) => return Err(e),
    };

    let tag_set = match rest.strip_prefix(',') {
        Some(tags) => {
            let (remaining, tag_set) = tag_set(tags)?;
            rest = remaining;
            Some(tag_set)
        }
        None => None,
    };

    Ok((
        rest,
        Series {
            raw_input: &i[..i.len() - rest.len()],
            measurement,
            tag_set,
        },
    ))
}

fn measurement(i: &str) -> IResult<&str, EscapedStr<'_>> {
    let normal_char = take_while1(|c| !is_whitespace_boundary_char(c) && c != ',' && c != '\\');

    let space = map(tag(" "), |_| " ");
    let comma = map(tag(","), |_| ",");
    let backslash = map(tag("\\"), |_| "\\");

    let escaped = alt((space, comma, backslash));

    escape_or_fallback(normal_char, "\\", escaped)(i)
}

fn tag_set(i: &str) -> IResult<&str, TagSet<'_>> {
    let mut tag_set = TagSet::new();
    let mut head = i;
    loop {
        match separated_pair(key, tag("="), literal)(head) {
            Ok((rest, pair)) => {
                tag_set.push(pair);
                match rest.strip_prefix(',') {
                    Some(next) => head = next,
                    None => return Ok((rest, tag_set)),
                }
            }
            Err(nom::Err::Error(_)) => {
                return Err(nom::Err::Failure(Error::TagSetInvalid {
                    content: head.to_string(),
                }));
            }
            Err(e) => return Err(e),
        }
    }
}

fn field_set(i: &str) -> IResult<&str, FieldSet<'_>> {
    let mut field_set = FieldSet::new();
    let mut head = i;
    loop {
        match separated_pair(key, tag("="), literal)(head) {
            Ok((rest, pair)) => {
                field_set.push(pair);
                match rest.strip_prefix(',') {
                    Some(next) => head = next,
                    None => return Ok((rest, field_set)),
                }
            }
            Err(nom::Err::Error(_)) if field_set.is_empty() => {
                return Err(nom::Err::Failure(Error::FieldSetMissing));
            }
            Err(nom::Err::Error(_)) => {
                return Err(nom::Err::Failure(Error::FieldSetInvalid {
                    content: head.to_string(),
                }));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Tag and field keys
fn key(i: &str) -> IResult<&str, EscapedStr<'_>> {
    let normal_char = take_while1(|c| {
        !is_whitespace_boundary_char(c) && c != '=' && c != ',' && c != '\\'
    });
    escaped_value(normal_char)(i)
}

/// A typed literal: a quoted string, an `L`-prefixed quoted string, or a bare token
/// classified by [`infer::infer_literal`].
fn literal(i: &str) -> IResult<&str, Literal<'_>> {
    if let Some(body) = i.strip_prefix("L\"") {
        let (rest, value) = quoted_body(i, body)?;
        return Ok((rest, Literal::NChar(value)));
    }
    if let Some(body) = i.strip_prefix('"') {
        let (rest, value) = quoted_body(i, body)?;
        return Ok((rest, Literal::Binary(value)));
    }

    let end = i
        .find(|c| is_whitespace_boundary_char(c) || c == ',')
        .unwrap_or(i.len());
    let (token, rest) = i.split_at(end);
    match infer::infer_literal(token) {
        Ok(value) => Ok((rest, value)),
        Err(e) => Err(nom::Err::Failure(e)),
    }
}

/// Scan a string literal body up to its closing quote. Backslash only escapes a double
/// quote or itself; any other backslash is kept as is.
fn quoted_body<'a>(start: &'a str, body: &'a str) -> IResult<&'a str, EscapedStr<'a>> {
    let mut copied: Option<String> = None;
    let mut segment_start = 0;
    let mut chars = body.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => {
                let value = match copied.take() {
                    Some(mut s) => {
                        s.push_str(&body[segment_start..idx]);
                        EscapedStr::CopiedValue(s)
                    }
                    None => EscapedStr::SingleSlice(&body[..idx]),
                };
                return Ok((&body[idx + 1..], value));
            }
            '\\' => {
                if let Some((next_idx, next)) = chars.clone().next() {
                    if next == '"' || next == '\\' {
                        let s = copied.get_or_insert_with(String::new);
                        s.push_str(&body[segment_start..idx]);
                        s.push(next);
                        chars.next();
                        segment_start = next_idx + next.len_utf8();
                    }
                }
            }
            _ => {}
        }
    }

    Err(nom::Err::Failure(Error::UnterminatedString {
        content: start.to_string(),
    }))
}

fn whitespace(i: &str) -> IResult<&str, &str> {
    take_while1(|c| c == ' ')(i)
}

fn is_whitespace_boundary_char(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\n'
}

fn is_line_end_char(c: char) -> bool {
    is_whitespace_boundary_char(c) || c == '\r'
}

/// While not all of these escape characters are required to be
/// escaped, we support the client escaping them proactively to
/// provide a common experience.
fn escaped_value<'a>(
    normal: impl Fn(&'a str) -> IResult<&'a str, &'a str>,
) -> impl FnOnce(&'a str) -> IResult<&'a str, EscapedStr<'a>> {
    move |i| {
        let backslash = map(tag("\\"), |_| "\\");
        let comma = map(tag(","), |_| ",");
        let equal = map(tag("="), |_| "=");
        let space = map(tag(" "), |_| " ");

        let escaped = alt((backslash, comma, equal, space));

        escape_or_fallback(normal, "\\", escaped)(i)
    }
}

/// Parse an unescaped piece of text, interspersed with
/// potentially-escaped characters. If the character *isn't* escaped,
/// treat it as a literal character.
fn escape_or_fallback<'a>(
    normal: impl FnMut(&'a str) -> IResult<&'a str, &'a str>,
    escape_char: &'static str,
    escaped: impl FnMut(&'a str) -> IResult<&'a str, &'a str>,
) -> impl FnOnce(&'a str) -> IResult<&'a str, EscapedStr<'a>> {
    move |i| {
        let (remaining, s) = escape_or_fallback_inner(normal, escape_char, escaped)(i)?;

        if s.ends_with('\\') {
            Err(nom::Err::Failure(Error::EndsWithBackslash))
        } else {
            Ok((remaining, s))
        }
    }
}

fn escape_or_fallback_inner<'a>(
    mut normal: impl FnMut(&'a str) -> IResult<&'a str, &'a str>,
    escape_char: &'static str,
    mut escaped: impl FnMut(&'a str) -> IResult<&'a str, &'a str>,
) -> impl FnMut(&'a str) -> IResult<&'a str, EscapedStr<'a>> {
    move |i| {
        let mut result = SmallVec::<[&str; 4]>::new();
        let mut head = i;

        loop {
            match normal(head) {
                Ok((remaining, parsed)) => {
                    result.push(parsed);
                    head = remaining;
                }
                Err(nom::Err::Error(_)) => {
                    if let Some(after) = head.strip_prefix(escape_char) {
                        match escaped(after) {
                            Ok((remaining, parsed)) => {
                                result.push(parsed);
                                head = remaining;
                            }
                            Err(nom::Err::Error(_)) => {
                                result.push(escape_char);
                                head = after;

                                // any other escaped character is taken literally
                                match head.chars().next() {
                                    Some(c) => {
                                        let (escaped, remaining) = head.split_at(c.len_utf8());
                                        result.push(escaped);
                                        head = remaining;
                                    }
                                    None => return Ok((head, EscapedStr::from_slices(&result))),
                                }
                            }
                            Err(e) => return Err(e),
                        }
                    } else if head == i {
                        return Err(nom::Err::Error(nom::error::ParseError::from_error_kind(
                            head,
                            nom::error::ErrorKind::EscapedTransform,
                        )));
                    } else {
                        return Ok((head, EscapedStr::from_slices(&result)));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Characters to escape when writing measurement names
const MEASUREMENT_DELIMITERS: &[char] = &[',', ' '];

/// Characters to escape when writing tag and field keys
const KEY_DELIMITERS: &[char] = &[',', '=', ' '];

/// Writes a str value to f, escaping all characters in `escaping_specification`.
fn escape_and_write_value(
    f: &mut fmt::Formatter<'_>,
    value: &str,
    escaping_specification: &[char],
) -> fmt::Result {
    let mut last = 0;

    for (idx, delim) in value.match_indices(escaping_specification) {
        let s = &value[last..idx];
        write!(f, r#"{s}\{delim}"#)?;
        last = idx + delim.len();
    }

    f.write_str(&value[last..])
}
