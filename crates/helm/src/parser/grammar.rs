//! Token-level `nom` parsers for the pieces of HELM that have a fixed shape

use std::fmt;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, char, digit1, one_of, u32},
    combinator::{consumed, map, map_opt, opt, recognize, verify},
    multi::many1,
    sequence::{pair, preceded, separated_pair, tuple},
};
use nom_miette::{LabeledParseError, expect, wrap_err};

use crate::{Attachment, HelmErrorKind, PolymerKind, Repeat};

pub type NomResult<'a, O> = IResult<&'a str, O, LabeledParseError<'a, HelmErrorKind>>;

/// A chain or group id like `PEPTIDE1` or `G2`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Reference {
    pub kind: PolymerKind,
    pub number: u32,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.number)
    }
}

/// Where on a chain a connection lands
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Site<'a> {
    Position(usize),
    /// `?` or `*`: somewhere on a chain, group, or blob that can't be pinned down
    Wildcard(&'a str),
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EndToken<'a> {
    pub reference: Reference,
    pub reference_text: &'a str,
    pub site: Site<'a>,
    pub attachment: Attachment,
    pub text: &'a str,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ConnectionToken<'a> {
    pub ends: [EndToken<'a>; 2],
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MemberToken<'a> {
    pub reference: Reference,
    pub ratio: Option<&'a str>,
    pub text: &'a str,
}

// ---------------------------------------------------------------------------------------------------------------------

/// Reference = Prefix , Number ;
/// Prefix = "RNA" | "PEPTIDE" | "CHEM" | "BLOB" | "G" ; (* case-insensitive *)
pub fn reference(i: &str) -> NomResult<Reference> {
    let prefix = map_opt(alpha1, |p: &str| p.parse::<PolymerKind>().ok());
    let parser = map(pair(prefix, u32), |(kind, number)| Reference { kind, number });
    expect(parser, HelmErrorKind::ExpectedReference)(i)
}

/// ChainId = Reference - GroupId ;
pub fn chain_id(i: &str) -> NomResult<Reference> {
    let parser = verify(reference, |r| r.kind != PolymerKind::Group);
    expect(parser, HelmErrorKind::ExpectedPolymerId)(i)
}

/// GroupId = "G" , Number ;
pub fn group_id(i: &str) -> NomResult<Reference> {
    let parser = verify(reference, |r| r.kind == PolymerKind::Group);
    expect(parser, HelmErrorKind::ExpectedGroup)(i)
}

/// Site = Number | "?" | "*" ;
fn site(i: &str) -> NomResult<Site> {
    alt((
        map(u32, |n| Site::Position(n as usize)),
        map(recognize(one_of("?*")), Site::Wildcard),
    ))(i)
}

/// Attachment = "R" , Number | "?" | "*" | "pair" ;
pub fn attachment(i: &str) -> NomResult<Attachment> {
    map_opt(
        alt((
            recognize(pair(char('R'), digit1)),
            tag("?"),
            tag("*"),
            tag("pair"),
        )),
        |a: &str| a.parse().ok(),
    )(i)
}

type End<'a> = (&'a str, (Site<'a>, Attachment));

/// End = Site , ":" , Attachment ;
fn end(i: &str) -> NomResult<End> {
    consumed(separated_pair(site, char(':'), attachment))(i)
}

fn end_token<'a>(
    (reference_text, reference): (&'a str, Reference),
    (text, (site, attachment)): End<'a>,
) -> EndToken<'a> {
    EndToken {
        reference,
        reference_text,
        site,
        attachment,
        text,
    }
}

/// Connection = Reference , "," , Reference , "," , End , "-" , End ;
pub fn connection(i: &str) -> NomResult<ConnectionToken> {
    let parser = map(
        tuple((
            consumed(reference),
            char(','),
            consumed(reference),
            char(','),
            end,
            char('-'),
            end,
        )),
        |(ref_a, _, ref_b, _, end_a, _, end_b)| ConnectionToken {
            ends: [end_token(ref_a, end_a), end_token(ref_b, end_b)],
        },
    );
    wrap_err(parser, HelmErrorKind::ExpectedConnection)(i)
}

/// Ratio = { digit | "." | "-" | "?" }- ;
fn ratio(i: &str) -> NomResult<&str> {
    recognize(many1(one_of("0123456789.-?")))(i)
}

/// Member = Reference , [ ":" , Ratio ] ;
pub fn member(i: &str) -> NomResult<MemberToken> {
    let parser = map(
        consumed(pair(reference, opt(preceded(char(':'), ratio)))),
        |(text, (reference, ratio))| MemberToken {
            reference,
            ratio,
            text,
        },
    );
    wrap_err(parser, HelmErrorKind::ExpectedGroup)(i)
}

/// Repeat = Count , [ "-" , Count ] ;
/// Count = digit - "0" , { digit } ;
pub fn repeat(i: &str) -> NomResult<Repeat> {
    let count = || verify(u32, |&n| n > 0);
    let parser = alt((
        verify(
            map(separated_pair(count(), char('-'), count()), |(low, high)| {
                Repeat::Range(low, high)
            }),
            |r| matches!(r, Repeat::Range(low, high) if low <= high),
        ),
        map(count(), Repeat::Exact),
    ));
    expect(parser, HelmErrorKind::ExpectedRepeat)(i)
}

/// Version = "V" , Number , "." , Number ;
pub fn version(i: &str) -> NomResult<&str> {
    let parser = recognize(tuple((char('V'), digit1, char('.'), digit1)));
    expect(parser, HelmErrorKind::ExpectedVersion)(i)
}
