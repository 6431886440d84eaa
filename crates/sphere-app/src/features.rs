//! Feature selection.
//!
//! Each feature is independent and combinable. The set is fixed at
//! [`init`](crate::Application::init); only the numeric knobs can change later.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use sphere_errors::{ResourceError, SphereError, SphereResult};

bitflags! {
    /// Features enabled for an application instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Features: u32 {
        /// Receive platform update notifications and allow deferral.
        const UPDATE_NOTIFICATION = 1 << 0;
        /// Enable network time synchronization at startup.
        const TIME_SYNC = 1 << 1;
        /// Reboot if the application stops petting the watchdog.
        const WATCHDOG = 1 << 2;
        /// Keep a connection to the cloud hub.
        const CLOUD_CONNECTIVITY = 1 << 3;
        /// Apply a keepalive period to the cloud connection.
        const KEEPALIVE = 1 << 4;
    }
}

const NAMES: [(Features, &str); 5] = [
    (Features::UPDATE_NOTIFICATION, "update_notification"),
    (Features::TIME_SYNC, "time_sync"),
    (Features::WATCHDOG, "watchdog"),
    (Features::CLOUD_CONNECTIVITY, "cloud_connectivity"),
    (Features::KEEPALIVE, "keepalive"),
];

impl Features {
    /// Name of a single feature, as used in configuration files.
    ///
    /// Returns `None` for an empty or combined set.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        NAMES
            .iter()
            .find(|(flag, _)| *flag == self)
            .map(|(_, name)| *name)
    }

    /// Look up a single feature by name.
    #[must_use]
    pub fn from_config_name(name: &str) -> Option<Self> {
        NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name.trim()))
            .map(|(flag, _)| *flag)
    }

    /// Names of every enabled feature, in declaration order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        NAMES
            .iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
    }

    /// Fail with [`ResourceError::FeatureDisabled`] unless `feature` is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::FeatureDisabled`] naming the first missing feature.
    pub fn require(self, feature: Features) -> SphereResult<()> {
        match (feature - self).iter().next() {
            None => Ok(()),
            Some(missing) => Err(ResourceError::FeatureDisabled(
                missing.name().unwrap_or("unknown"),
            )
            .into()),
        }
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for (i, name) in self.names().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}

impl FromStr for Features {
    type Err = SphereError;

    /// Parse a comma-separated list such as `watchdog,cloud_connectivity`.
    /// `none` and the empty string parse to the empty set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            return Ok(Features::empty());
        }
        s.split(',').try_fold(Features::empty(), |acc, name| {
            Features::from_config_name(name)
                .map(|flag| acc | flag)
                .ok_or_else(|| SphereError::config(format!("unknown feature '{}'", name.trim())))
        })
    }
}

impl Serialize for Features {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.iter().count()))?;
        for name in self.names() {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

struct FeaturesVisitor;

impl<'de> Visitor<'de> for FeaturesVisitor {
    type Value = Features;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of feature names")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Features, A::Error> {
        let mut features = Features::empty();
        while let Some(name) = seq.next_element::<String>()? {
            let flag = Features::from_config_name(&name)
                .ok_or_else(|| de::Error::custom(format!("unknown feature '{name}'")))?;
            features |= flag;
        }
        Ok(features)
    }
}

impl<'de> Deserialize<'de> for Features {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(FeaturesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_names_are_lowercase() {
        assert_eq!(
            Features::from_config_name(" Cloud_Connectivity "),
            Some(Features::CLOUD_CONNECTIVITY)
        );
        assert_eq!(Features::from_config_name("gpio"), None);
        // Flag constant names stay available through bitflags.
        assert_eq!(Features::from_name("KEEPALIVE"), Some(Features::KEEPALIVE));
        assert_eq!(Features::KEEPALIVE.name(), Some("keepalive"));
    }

    #[test]
    fn test_parse_list() -> Result<(), SphereError> {
        let features: Features = "watchdog, cloud_connectivity".parse()?;
        assert_eq!(features, Features::WATCHDOG | Features::CLOUD_CONNECTIVITY);
        assert_eq!("none".parse::<Features>()?, Features::empty());
        assert!("watchdog,gpio".parse::<Features>().is_err());
        Ok(())
    }

    #[test]
    fn test_display_round_trips() -> Result<(), SphereError> {
        let features = Features::UPDATE_NOTIFICATION | Features::KEEPALIVE;
        assert_eq!(features.to_string(), "update_notification,keepalive");
        assert_eq!(features.to_string().parse::<Features>()?, features);
        assert_eq!(Features::empty().to_string(), "none");
        Ok(())
    }

    #[test]
    fn test_require_names_missing_feature() {
        let enabled = Features::WATCHDOG;
        assert!(enabled.require(Features::WATCHDOG).is_ok());
        let err = enabled.require(Features::WATCHDOG | Features::KEEPALIVE);
        assert!(matches!(
            err,
            Err(SphereError::Resource(ResourceError::FeatureDisabled("keepalive")))
        ));
    }

    #[test]
    fn test_serde_as_names() -> Result<(), serde_json::Error> {
        let features = Features::TIME_SYNC | Features::WATCHDOG;
        let json = serde_json::to_string(&features)?;
        assert_eq!(json, r#"["time_sync","watchdog"]"#);
        let back: Features = serde_json::from_str(&json)?;
        assert_eq!(back, features);
        assert!(serde_json::from_str::<Features>(r#"["warp_drive"]"#).is_err());
        Ok(())
    }
}
