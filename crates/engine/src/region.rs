//! Regional scope: the `my`/`in` segment selects the currency.

use std::{fmt, str::FromStr};

use api_types::{Currency, UnknownVariant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Region {
    #[default]
    Malaysia,
    India,
}

impl Region {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malaysia => "my",
            Self::India => "in",
        }
    }

    pub const fn currency(self) -> Currency {
        match self {
            Self::Malaysia => Currency::Myr,
            Self::India => Currency::Inr,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "my" => Ok(Self::Malaysia),
            "in" => Ok(Self::India),
            other => Err(UnknownVariant {
                kind: "region",
                value: other.to_string(),
            }),
        }
    }
}
