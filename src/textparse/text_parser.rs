use nom::branch::alt;
use nom::bytes::complete::{escaped, is_not, tag, take_till1, take_while};
use nom::character::complete::{char, digit1, satisfy, space0, space1};
use nom::combinator::{all_consuming, consumed, cut, map, map_res, opt, recognize, rest, value};
use nom::multi::separated_list0;
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;

use super::{MetricType, SampleSource};
use crate::common::types::Timestamp;
use crate::common::{Labels, METRIC_NAME_LABEL};
use crate::error::TsdbError;

const MAX_ERROR_CONTEXT: usize = 32;

#[derive(Debug, Clone, PartialEq)]
struct SeriesLine<'a> {
    /// the metric name and label set, as written
    series: &'a str,
    name: &'a str,
    labels: Vec<(&'a str, String)>,
    value: f64,
    timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq)]
enum Comment<'a> {
    Help(&'a str, &'a str),
    Type(&'a str, MetricType),
    Other,
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn metric_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| is_name_start(c) || c == ':'),
        take_while(|c| is_name_char(c) || c == ':'),
    ))(input)
}

fn label_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_name_start), take_while(is_name_char)))(input)
}

/// A double quoted label value. `\\`, `\"` and `\n` are unescaped, any other escape is kept
/// as written.
fn label_value(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            opt(escaped(is_not("\\\"\n"), '\\', satisfy(|c| c != '\n'))),
            |raw| unescape_label_value(raw.unwrap_or_default()),
        ),
        char('"'),
    )(input)
}

fn unescape_label_value(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn label_pair(input: &str) -> IResult<&str, (&str, String)> {
    let (rest, (name, _, _, _, value)) =
        tuple((label_name, space0, char('='), space0, label_value))(input)?;
    Ok((rest, (name, value)))
}

fn label_set(input: &str) -> IResult<&str, Vec<(&str, String)>> {
    preceded(
        char('{'),
        cut(delimited(
            space0,
            separated_list0(tuple((space0, char(','), space0)), label_pair),
            tuple((space0, opt(char(',')), space0, char('}'))),
        )),
    )(input)
}

fn parse_float(s: &str) -> Result<f64, std::num::ParseFloatError> {
    match s {
        "NaN" | "nan" => Ok(f64::NAN),
        "Inf" | "+Inf" | "inf" | "+inf" => Ok(f64::INFINITY),
        "-Inf" | "-inf" => Ok(f64::NEG_INFINITY),
        _ => s.parse::<f64>(),
    }
}

fn float_value(input: &str) -> IResult<&str, f64> {
    map_res(take_till1(|c| c == ' ' || c == '\t'), parse_float)(input)
}

fn timestamp(input: &str) -> IResult<&str, Timestamp> {
    map_res(
        recognize(pair(opt(alt((char('-'), char('+')))), digit1)),
        str::parse::<Timestamp>,
    )(input)
}

fn series_line(input: &str) -> IResult<&str, SeriesLine<'_>> {
    let (rest, (series, (name, labels))) =
        consumed(pair(metric_name, opt(preceded(space0, label_set))))(input)?;
    let (rest, value) = if labels.is_some() {
        preceded(space0, float_value)(rest)?
    } else {
        preceded(space1, float_value)(rest)?
    };
    let (rest, timestamp) = opt(preceded(space1, timestamp))(rest)?;
    let (rest, _) = space0(rest)?;
    Ok((
        rest,
        SeriesLine {
            series,
            name,
            labels: labels.unwrap_or_default(),
            value,
            timestamp,
        },
    ))
}

fn comment_line(input: &str) -> IResult<&str, Comment<'_>> {
    preceded(
        pair(char('#'), space0),
        alt((
            map(
                preceded(
                    pair(tag("HELP"), space1),
                    cut(pair(metric_name, opt(preceded(space1, rest)))),
                ),
                |(name, help)| Comment::Help(name, help.unwrap_or_default()),
            ),
            map(
                preceded(
                    pair(tag("TYPE"), space1),
                    cut(pair(
                        metric_name,
                        preceded(space1, map_res(rest, |s: &str| s.trim().parse::<MetricType>())),
                    )),
                ),
                |(name, metric_type)| Comment::Type(name, metric_type),
            ),
            value(Comment::Other, rest),
        )),
    )(input)
}

fn describe_error(err: nom::Err<nom::error::Error<&str>>) -> String {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            if e.input.is_empty() {
                "unexpected end of line".to_string()
            } else {
                let context: String = e.input.chars().take(MAX_ERROR_CONTEXT).collect();
                format!("unexpected {context:?}")
            }
        }
        nom::Err::Incomplete(_) => "unexpected end of line".to_string(),
    }
}

/// Parser for the Prometheus text exposition format.
///
/// ```text
/// # HELP http_requests_total The total number of HTTP requests.
/// # TYPE http_requests_total counter
/// http_requests_total{method="post",code="200"} 1027 1395066363000
/// ```
///
/// Parsing is lazy: each call to `advance` consumes input up to the next sample. The first
/// malformed line ends the stream and is reported through `err`.
pub struct TextParser<'a> {
    input: &'a [u8],
    pos: usize,
    line_no: usize,
    current: Option<SeriesLine<'a>>,
    help: Option<(&'a str, &'a str)>,
    metric_type: Option<(&'a str, MetricType)>,
    err: Option<TsdbError>,
}

impl<'a> TextParser<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        TextParser {
            input,
            pos: 0,
            line_no: 0,
            current: None,
            help: None,
            metric_type: None,
            err: None,
        }
    }

    /// 1-based number of the last line read.
    pub fn line(&self) -> usize {
        self.line_no
    }

    /// Metric name and text of the last `# HELP` line seen.
    pub fn help(&self) -> Option<(&'a str, &'a str)> {
        self.help
    }

    /// Metric name and type of the last `# TYPE` line seen.
    pub fn metric_type(&self) -> Option<(&'a str, MetricType)> {
        self.metric_type
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        let input: &'a [u8] = self.input;
        if self.pos >= input.len() {
            return None;
        }
        let remaining = &input[self.pos..];
        let (line, consumed) = match remaining.iter().position(|&b| b == b'\n') {
            Some(idx) => (&remaining[..idx], idx + 1),
            None => (remaining, remaining.len()),
        };
        self.pos += consumed;
        self.line_no += 1;
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }

    fn fail(&mut self, msg: String) -> bool {
        self.current = None;
        // a fault ends the stream even once the error has been taken
        self.pos = self.input.len();
        self.err = Some(TsdbError::parse(self.line_no, msg));
        false
    }
}

impl SampleSource for TextParser<'_> {
    fn advance(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        self.current = None;
        while let Some(raw) = self.next_line() {
            let line = match std::str::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => return self.fail(format!("invalid utf-8: {e}")),
            };
            let line = line.trim_start_matches([' ', '\t']);
            if line.trim_end().is_empty() {
                continue;
            }
            if line.starts_with('#') {
                match all_consuming(comment_line)(line) {
                    Ok((_, Comment::Help(name, help))) => self.help = Some((name, help)),
                    Ok((_, Comment::Type(name, metric_type))) => {
                        self.metric_type = Some((name, metric_type))
                    }
                    Ok((_, Comment::Other)) => {}
                    Err(e) => return self.fail(describe_error(e)),
                }
                continue;
            }
            match all_consuming(series_line)(line) {
                Ok((_, series)) => {
                    self.current = Some(series);
                    return true;
                }
                Err(e) => return self.fail(describe_error(e)),
            }
        }
        false
    }

    fn at(&self) -> (&[u8], Option<Timestamp>, f64) {
        match &self.current {
            Some(series) => (series.series.as_bytes(), series.timestamp, series.value),
            None => (&[], None, f64::NAN),
        }
    }

    fn metric(&self, labels: &mut Labels) {
        labels.clear();
        if let Some(series) = &self.current {
            labels.insert(METRIC_NAME_LABEL, series.name);
            for (name, value) in series.labels.iter() {
                labels.insert(*name, value.as_str());
            }
        }
    }

    fn err(&self) -> Option<&TsdbError> {
        self.err.as_ref()
    }

    fn take_err(&mut self) -> Option<TsdbError> {
        self.err.take()
    }
}
