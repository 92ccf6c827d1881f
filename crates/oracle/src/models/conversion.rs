use serde::{Deserialize, Serialize};

use super::currency_pair::CurrencyPair;

/// One edge of a conversion chain.
///
/// When `invert` is set the leg is walked quote → base and its price is
/// used as a reciprocal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionLeg {
    #[serde(alias = "currency_pair")]
    pub pair: CurrencyPair,
    #[serde(default)]
    pub invert: bool,
}

impl ConversionLeg {
    pub fn new(pair: CurrencyPair, invert: bool) -> Self {
        Self { pair, invert }
    }

    /// Currency this leg converts from.
    pub fn start(&self) -> &str {
        if self.invert {
            self.pair.quote()
        } else {
            self.pair.base()
        }
    }

    /// Currency this leg converts into.
    pub fn end(&self) -> &str {
        if self.invert {
            self.pair.base()
        } else {
            self.pair.quote()
        }
    }
}

/// Ordered chain of legs converting a start currency into a target currency.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversionPath {
    pub legs: Vec<ConversionLeg>,
}

impl ConversionPath {
    pub fn new(legs: Vec<ConversionLeg>) -> Self {
        Self { legs }
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Effective start currency, if the path has any legs.
    pub fn start(&self) -> Option<&str> {
        self.legs.first().map(ConversionLeg::start)
    }

    /// Effective end currency, if the path has any legs.
    pub fn end(&self) -> Option<&str> {
        self.legs.last().map(ConversionLeg::end)
    }

    /// Pairs whose prices are needed to walk this path.
    pub fn pairs(&self) -> impl Iterator<Item = &CurrencyPair> {
        self.legs.iter().map(|leg| &leg.pair)
    }
}

impl FromIterator<ConversionLeg> for ConversionPath {
    fn from_iter<I: IntoIterator<Item = ConversionLeg>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
