use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{anychar, char, none_of, satisfy, space0},
    combinator::{all_consuming, map, opt, recognize},
    error::{Error, ParseError},
    multi::{many0, many1, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::stringutil::CharClassExt;

fn token<'a, E>(input: &'a str) -> IResult<&'a str, &'a str, E>
where
    E: ParseError<&'a str>,
{
    take_while1(|c: char| c.is_ascii() && (c as u8).is_token())(input)
}

fn digit<'a, E>(input: &'a str) -> IResult<&'a str, u8, E>
where
    E: ParseError<&'a str>,
{
    map(satisfy(|c| c.is_ascii_digit()), |c| c as u8 - b'0')(input)
}

fn http_version<'a, E>(input: &'a str) -> IResult<&'a str, (u8, u8), E>
where
    E: ParseError<&'a str>,
{
    map(
        tuple((tag("HTTP/"), digit, char('.'), digit)),
        |(_, major, _, minor)| (major, minor),
    )(input)
}

fn quoted_string<'a, E>(input: &'a str) -> IResult<&'a str, String, E>
where
    E: ParseError<&'a str>,
{
    map(
        delimited(
            char('"'),
            many0(alt((preceded(char('\\'), anychar), none_of("\"\\")))),
            char('"'),
        ),
        |chars: Vec<char>| chars.into_iter().collect::<String>(),
    )(input)
}

fn chunk_extension_value<'a, E>(input: &'a str) -> IResult<&'a str, String, E>
where
    E: ParseError<&'a str>,
{
    alt((quoted_string, map(token, String::from)))(input)
}

fn chunk_extension<'a, E>(input: &'a str) -> IResult<&'a str, (String, String), E>
where
    E: ParseError<&'a str>,
{
    map(
        preceded(
            pair(space0, char(';')),
            pair(
                delimited(space0, token, space0),
                opt(preceded(
                    pair(char('='), space0),
                    chunk_extension_value,
                )),
            ),
        ),
        |(name, value)| (name.to_string(), value.unwrap_or_default()),
    )(input)
}

fn list_element<'a, E>(input: &'a str) -> IResult<&'a str, &'a str, E>
where
    E: ParseError<&'a str>,
{
    map(
        recognize(many1(alt((recognize(quoted_string), is_not(",\""))))),
        |element: &str| element.trim_matches(|c| c == ' ' || c == '\t'),
    )(input)
}

/// Parses a whole version token such as `HTTP/1.1`.
pub fn parse_http_version(input: &str) -> Result<(u8, u8), nom::Err<Error<&str>>> {
    let (_, version) = all_consuming(http_version::<Error<&str>>)(input)?;
    Ok(version)
}

/// Parses the extensions part of a chunk-size line, starting at the first `;`.
pub fn parse_chunk_extensions(
    input: &str,
) -> Result<Vec<(String, String)>, nom::Err<Error<&str>>> {
    let (_, extensions) =
        all_consuming(terminated(many0(chunk_extension::<Error<&str>>), space0))(input)?;
    Ok(extensions)
}

/// Parses a comma separated field value. Empty elements are dropped.
pub fn parse_comma_list(input: &str) -> Result<Vec<&str>, nom::Err<Error<&str>>> {
    let (_, elements) = all_consuming(separated_list0(
        char(','),
        opt(list_element::<Error<&str>>),
    ))(input)?;

    Ok(elements
        .into_iter()
        .flatten()
        .filter(|element| !element.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_version() {
        assert_eq!(parse_http_version("HTTP/1.1"), Ok((1, 1)));
        assert_eq!(parse_http_version("HTTP/2.0"), Ok((2, 0)));
        assert!(parse_http_version("HTTP/1.1x").is_err());
        assert!(parse_http_version("HTTP/x.1").is_err());
        assert!(parse_http_version("").is_err());
    }

    #[test]
    fn test_chunk_extensions() {
        assert_eq!(parse_chunk_extensions(""), Ok(vec![]));
        assert_eq!(
            parse_chunk_extensions(";a=1;b"),
            Ok(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "".to_string())
            ])
        );
        assert_eq!(
            parse_chunk_extensions(" ; name = \"quoted \\\"value\\\"\" ;x=y "),
            Ok(vec![
                ("name".to_string(), "quoted \"value\"".to_string()),
                ("x".to_string(), "y".to_string())
            ])
        );
        assert_eq!(
            parse_chunk_extensions(";empty=\"\""),
            Ok(vec![("empty".to_string(), "".to_string())])
        );
        assert!(parse_chunk_extensions(";").is_err());
        assert!(parse_chunk_extensions(";a=").is_err());
        assert!(parse_chunk_extensions("a=1").is_err());
    }

    #[test]
    fn test_comma_list() {
        assert_eq!(parse_comma_list("gzip, chunked"), Ok(vec!["gzip", "chunked"]));
        assert_eq!(parse_comma_list(" a ,, b,"), Ok(vec!["a", "b"]));
        assert_eq!(
            parse_comma_list("text/html; q=\"1,2\", */*"),
            Ok(vec!["text/html; q=\"1,2\"", "*/*"])
        );
        assert_eq!(parse_comma_list(""), Ok(vec![]));
        assert!(parse_comma_list("\"unterminated").is_err());
    }
}
