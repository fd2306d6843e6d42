use std::time::Duration;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::digit1;
use nom::combinator::{all_consuming, map_res};
use nom::multi::many1;
use nom::sequence::pair;
use nom::IResult;

use crate::error::{TsdbError, TsdbResult};

const MILLIS_PER_SECOND: u64 = 1000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u64 = 24 * MILLIS_PER_HOUR;
const MILLIS_PER_WEEK: u64 = 7 * MILLIS_PER_DAY;
const MILLIS_PER_YEAR: u64 = 365 * MILLIS_PER_DAY;

fn unit_millis(input: &str) -> IResult<&str, u64> {
    // "ms" has to be tried before "m"
    let (rest, unit) = alt((
        tag("ms"),
        tag("s"),
        tag("m"),
        tag("h"),
        tag("d"),
        tag("w"),
        tag("y"),
    ))(input)?;
    let millis = match unit {
        "ms" => 1,
        "s" => MILLIS_PER_SECOND,
        "m" => MILLIS_PER_MINUTE,
        "h" => MILLIS_PER_HOUR,
        "d" => MILLIS_PER_DAY,
        "w" => MILLIS_PER_WEEK,
        _ => MILLIS_PER_YEAR,
    };
    Ok((rest, millis))
}

fn duration_component(input: &str) -> IResult<&str, u64> {
    let (rest, (count, unit)) = pair(map_res(digit1, str::parse::<u64>), unit_millis)(input)?;
    Ok((rest, count.saturating_mul(unit)))
}

fn duration_millis(input: &str) -> IResult<&str, u64> {
    let (rest, parts) = all_consuming(many1(duration_component))(input)?;
    Ok((rest, parts.into_iter().fold(0u64, u64::saturating_add)))
}

/// Parses a Prometheus style duration such as `90s`, `1h30m` or `15d`. A bare integer is
/// taken as milliseconds.
pub fn parse_duration(arg: &str) -> TsdbResult<Duration> {
    let arg = arg.trim();
    if let Ok(millis) = arg.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    match duration_millis(arg) {
        Ok((_, millis)) => Ok(Duration::from_millis(millis)),
        Err(_) => Err(TsdbError::InvalidDuration(arg.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1500", 1500 ; "bare millis")]
    #[test_case("250ms", 250 ; "millis")]
    #[test_case("90s", 90_000 ; "seconds")]
    #[test_case("5m", 300_000 ; "minutes")]
    #[test_case("1h30m", 5_400_000 ; "compound")]
    #[test_case("2d", 172_800_000 ; "days")]
    #[test_case("1w", 604_800_000 ; "weeks")]
    #[test_case("1y", 31_536_000_000 ; "years")]
    fn test_parse_duration(input: &str, expected_millis: u64) {
        assert_eq!(parse_duration(input).unwrap(), Duration::from_millis(expected_millis));
    }

    #[test_case("" ; "empty")]
    #[test_case("h" ; "unit only")]
    #[test_case("10x" ; "unknown unit")]
    #[test_case("5m junk" ; "trailing text")]
    #[test_case("-5m" ; "negative")]
    fn test_parse_duration_invalid(input: &str) {
        assert!(matches!(parse_duration(input), Err(TsdbError::InvalidDuration(_))));
    }
}
