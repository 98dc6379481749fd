// src/name_decomposer.rs
//
// Splits a free-text personal name into title / first / middle / last / suffix.
// Pure and total: any input yields a decomposition, unusable input yields an
// empty one.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameDecomposition {
    pub prefix: Option<String>,
    pub first: Option<String>,
    pub middle: Option<String>,
    pub last: Option<String>,
    pub suffix: Option<String>,
}

impl NameDecomposition {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

static TITLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "mr", "mrs", "ms", "miss", "mx", "master", "dr", "doctor", "prof", "professor", "rev",
        "reverend", "fr", "father", "pastor", "rabbi", "imam", "br", "brother", "sister", "sir",
        "dame", "lord", "lady", "madam", "mme", "mlle", "hon", "honorable", "judge", "justice",
        "gov", "governor", "sen", "senator", "rep", "representative", "pres", "president", "mayor",
        "capt", "captain", "col", "colonel", "gen", "general", "lt", "lieutenant", "maj", "major",
        "sgt", "sergeant", "cmdr", "commander", "adm", "admiral", "cpl", "pvt", "herr", "frau",
        "sra", "srta", "dra",
    ]
    .into_iter()
    .collect()
});

static SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "jr", "jnr", "sr", "snr", "ii", "iii", "iv", "v", "vi", "vii", "2nd", "3rd", "4th", "phd",
        "md", "dds", "dmd", "dvm", "jd", "esq", "esquire", "cpa", "rn", "mba", "ret", "usn", "usmc",
        "usaf", "cfa",
    ]
    .into_iter()
    .collect()
});

/// Lower-case particles that attach to the following token as part of the last name.
static LAST_NAME_PARTICLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "van", "von", "der", "den", "de", "del", "della", "dela", "di", "da", "dos", "das", "du",
        "la", "le", "st", "ste", "san", "bin", "ibn", "al", "el", "ter", "ten", "vander", "mac",
    ]
    .into_iter()
    .collect()
});

/// Characters ignored when matching a token against the dictionaries. Only
/// the dictionary lookups use this; tokens in any script are kept.
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]").expect("static regex"));

/// Tokens wrapped in quotes or parentheses are nicknames and are dropped.
static NICKNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(\(.*\)|".*"|'.*'|“.*”)$"#).expect("static regex"));

fn key(token: &str) -> String {
    NON_ALNUM.replace_all(&token.to_lowercase(), "").into_owned()
}

fn is_title(token: &str) -> bool {
    TITLES.contains(key(token).as_str())
}

fn is_suffix(token: &str) -> bool {
    SUFFIXES.contains(key(token).as_str())
}

fn is_particle(token: &str) -> bool {
    LAST_NAME_PARTICLES.contains(key(token).as_str())
}

fn tokens(segment: &str) -> Vec<&str> {
    segment
        .split_whitespace()
        .map(|t| t.trim_matches(','))
        .filter(|t| t.chars().any(char::is_alphanumeric) && !NICKNAME.is_match(t))
        .collect()
}

fn join(parts: &[&str]) -> Option<String> {
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Take leading titles off `tokens`, always leaving at least one token.
fn split_titles<'a>(tokens: &mut Vec<&'a str>) -> Vec<&'a str> {
    let mut titles = Vec::new();
    while tokens.len() > 1 && is_title(tokens[0]) {
        titles.push(tokens.remove(0));
    }
    titles
}

/// Take trailing suffixes off `tokens`, always leaving at least one token.
fn split_suffixes<'a>(tokens: &mut Vec<&'a str>) -> Vec<&'a str> {
    let mut suffixes = Vec::new();
    while tokens.len() > 1 && tokens.last().is_some_and(|t| is_suffix(t)) {
        if let Some(t) = tokens.pop() {
            suffixes.insert(0, t);
        }
    }
    suffixes
}

/// Decompose `full_name`. Never fails; an empty or unusable name yields an
/// all-`None` decomposition.
pub fn decompose(full_name: &str) -> NameDecomposition {
    let segments: Vec<&str> = full_name.split(',').collect();

    // "Public, John Q., Jr." style: the first segment is the family name.
    if segments.len() > 1 {
        let rest: Vec<&str> = segments[1..].iter().flat_map(|s| tokens(s)).collect();
        let family = tokens(segments[0]);
        let rest_is_suffixes = !rest.is_empty() && rest.iter().all(|t| is_suffix(t));

        if !family.is_empty() && !rest.is_empty() && !rest_is_suffixes {
            return decompose_inverted(family, &segments[1..]);
        }
    }

    let mut toks: Vec<&str> = segments.iter().flat_map(|s| tokens(s)).collect();
    if toks.is_empty() {
        return NameDecomposition::default();
    }

    let titles = split_titles(&mut toks);
    let suffixes = split_suffixes(&mut toks);

    let mut out = NameDecomposition {
        prefix: join(&titles),
        suffix: join(&suffixes),
        ..Default::default()
    };

    match toks.len() {
        0 => {}
        // "Mr. Smith": a lone name after a title is a family name.
        1 if out.prefix.is_some() => out.last = Some(toks[0].to_string()),
        1 => out.first = Some(toks[0].to_string()),
        n => {
            // Extend the last name leftwards over particles, never into the first name.
            let mut last_start = n - 1;
            while last_start > 1 && is_particle(toks[last_start - 1]) {
                last_start -= 1;
            }
            out.first = Some(toks[0].to_string());
            out.middle = join(&toks[1..last_start]);
            out.last = join(&toks[last_start..]);
        }
    }
    out
}

fn decompose_inverted(mut family: Vec<&str>, given_segments: &[&str]) -> NameDecomposition {
    let mut suffixes = split_suffixes(&mut family);
    let mut given: Vec<&str> = Vec::new();

    for seg in given_segments {
        let toks = tokens(seg);
        if !given.is_empty() && !toks.is_empty() && toks.iter().all(|t| is_suffix(t)) {
            suffixes.extend(toks);
        } else {
            given.extend(toks);
        }
    }

    let titles = split_titles(&mut given);
    suffixes.splice(0..0, split_suffixes(&mut given));

    NameDecomposition {
        prefix: join(&titles),
        first: given.first().map(|s| s.to_string()),
        middle: given.get(1..).and_then(join),
        last: join(&family),
        suffix: join(&suffixes),
    }
}
