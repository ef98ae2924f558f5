// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API microversion negotiation.
//!
//! Clients send `Oasis-API-Version: <major>.<minor>` (or `latest`). A missing
//! header negotiates the minimum supported version. Responses always carry
//! the supported range; the negotiated version is echoed only on success.

use std::fmt;

use tracing::debug;

use crate::error::VersionError;

pub const VERSION_HEADER: &str = "Oasis-API-Version";
pub const MIN_VERSION_HEADER: &str = "Oasis-API-Minimum-Version";
pub const MAX_VERSION_HEADER: &str = "Oasis-API-Maximum-Version";

/// The only major version this service implements.
pub const BASE_VERSION: u32 = 1;
pub const MIN_VERSION: ApiVersion = ApiVersion::new(1, 0);
pub const MAX_VERSION: ApiVersion = ApiVersion::new(1, 0);

/// A `(major, minor)` pair. Ordering is lexicographic, major first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `"major.minor"`. Anything else is `InvalidVersionFormat`.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidVersionFormat(raw.to_string());
        let (major, minor) = raw.trim().split_once('.').ok_or_else(invalid)?;
        let major = major.parse::<u32>().map_err(|_| invalid())?;
        let minor = minor.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self { major, minor })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionNegotiator {
    base_major: u32,
    min: ApiVersion,
    max: ApiVersion,
}

impl Default for VersionNegotiator {
    fn default() -> Self {
        Self::new(BASE_VERSION, MIN_VERSION, MAX_VERSION)
    }
}

impl VersionNegotiator {
    pub const fn new(base_major: u32, min: ApiVersion, max: ApiVersion) -> Self {
        Self {
            base_major,
            min,
            max,
        }
    }

    pub fn min(&self) -> ApiVersion {
        self.min
    }

    pub fn max(&self) -> ApiVersion {
        self.max
    }

    /// Negotiate the version for one request from its raw header value.
    ///
    /// Only an absent header means "oldest supported"; a present but blank
    /// value is malformed.
    pub fn negotiate(&self, header: Option<&str>) -> Result<ApiVersion, VersionError> {
        let requested = match header.map(str::trim) {
            None => self.min,
            Some(raw) if raw.eq_ignore_ascii_case("latest") => self.max,
            Some(raw) => ApiVersion::parse(raw)?,
        };

        if requested.major != self.base_major {
            return Err(VersionError::UnsupportedMajorVersion {
                requested: requested.major,
                supported: self.base_major,
            });
        }

        if requested < self.min || requested > self.max {
            return Err(VersionError::VersionOutOfRange {
                requested,
                min: self.min,
                max: self.max,
            });
        }

        debug!(version = %requested, "negotiated API version");
        Ok(requested)
    }

    /// Headers to attach to a response. The range is always present; the
    /// negotiated version only when negotiation succeeded.
    pub fn response_headers(
        &self,
        negotiated: Option<ApiVersion>,
    ) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (MIN_VERSION_HEADER, self.min.to_string()),
            (MAX_VERSION_HEADER, self.max.to_string()),
        ];
        if let Some(version) = negotiated {
            headers.push((VERSION_HEADER, version.to_string()));
        }
        headers
    }
}

/// Negotiate against the service's built-in range.
pub fn negotiate_version(header: Option<&str>) -> Result<ApiVersion, VersionError> {
    VersionNegotiator::default().negotiate(header)
}
