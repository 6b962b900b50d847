use std::fmt;
use std::str::FromStr;

use scene::{Breadcrumb, Region, RegionLevel};

/// One scripted user action.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Home,
    /// Pick a level-1 region from the list.
    Select(String),
    /// Click the boundary of a region visible on the map.
    Click(Region),
    /// Click a breadcrumb entry.
    Crumb(RegionLevel),
    Year(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepParseError(String);

impl fmt::Display for StepParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StepParseError {}

impl FromStr for Step {
    type Err = StepParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |msg: &str| StepParseError(format!("{msg}: {s:?}"));
        if s == "home" {
            return Ok(Step::Home);
        }
        let (verb, arg) = s
            .split_once(':')
            .ok_or_else(|| err("expected home or <action>:<argument>"))?;
        let arg = arg.trim();
        match verb {
            "select" if !arg.is_empty() => Ok(Step::Select(arg.to_string())),
            "click" => {
                let names: Vec<String> = arg.split('/').map(|n| n.trim().to_string()).collect();
                if names.len() > 3 || names.iter().any(String::is_empty) {
                    return Err(err("click takes one to three non-empty names"));
                }
                let mut names = names.into_iter();
                Breadcrumb::from_parts(names.next(), names.next(), names.next())
                    .region()
                    .map(Step::Click)
                    .ok_or_else(|| err("click needs a region name"))
            }
            "crumb" => arg
                .parse::<usize>()
                .ok()
                .and_then(RegionLevel::from_depth)
                .map(Step::Crumb)
                .ok_or_else(|| err("crumb takes 1, 2 or 3")),
            "year" => arg
                .parse()
                .map(Step::Year)
                .map_err(|_| err("year must be an integer")),
            _ => Err(err("unknown step")),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Home => write!(f, "home"),
            Step::Select(name) => write!(f, "select:{name}"),
            Step::Click(region) => {
                let names: Vec<&str> = RegionLevel::ALL
                    .into_iter()
                    .filter_map(|l| region.value(l))
                    .collect();
                write!(f, "click:{}", names.join("/"))
            }
            Step::Crumb(level) => write!(f, "crumb:{}", level.depth()),
            Step::Year(year) => write!(f, "year:{year}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Step;
    use pretty_assertions::assert_eq;
    use scene::{Region, RegionLevel};

    #[test]
    fn parses_every_step_kind() {
        assert_eq!("home".parse(), Ok(Step::Home));
        assert_eq!("select:Siak".parse(), Ok(Step::Select("Siak".into())));
        assert_eq!("crumb:2".parse(), Ok(Step::Crumb(RegionLevel::Level2)));
        assert_eq!("year:2010".parse(), Ok(Step::Year(2010)));
        assert_eq!(
            "click:Siak/Mempura".parse(),
            Ok(Step::Click(Region::Level2 {
                level1: "Siak".into(),
                level2: "Mempura".into()
            }))
        );
    }

    #[test]
    fn rejects_malformed_steps() {
        for bad in ["", "jump:1", "crumb:4", "year:soon", "select:", "click:a//c", "click:a/b/c/d"] {
            assert!(bad.parse::<Step>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn display_matches_the_input_form() {
        for step in ["home", "select:Siak", "click:Siak/Mempura/Benteng", "crumb:1", "year:1999"] {
            assert_eq!(step.parse::<Step>().unwrap().to_string(), step);
        }
    }
}
