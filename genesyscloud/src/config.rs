//! Provider configuration
//!
//! Every setting can come from the declared provider configuration or, when
//! absent there, from a `GENESYSCLOUD_*` environment variable.

use reconcile::{AttributePath, Diagnostics, DynamicValue};

pub const ACCESS_TOKEN_ENV: &str = "GENESYSCLOUD_ACCESS_TOKEN";
pub const REGION_ENV: &str = "GENESYSCLOUD_REGION";
pub const API_URL_ENV: &str = "GENESYSCLOUD_API_URL";
pub const REQUEST_TIMEOUT_ENV: &str = "GENESYSCLOUD_REQUEST_TIMEOUT";

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// API base URL for each region
const REGIONS: &[(&str, &str)] = &[
    ("us-east-1", "https://api.mypurecloud.com"),
    ("us-east-2", "https://api.use2.us-gov-pure.cloud"),
    ("us-west-2", "https://api.usw2.pure.cloud"),
    ("ca-central-1", "https://api.cac1.pure.cloud"),
    ("sa-east-1", "https://api.sae1.pure.cloud"),
    ("eu-central-1", "https://api.mypurecloud.de"),
    ("eu-central-2", "https://api.euc2.pure.cloud"),
    ("eu-west-1", "https://api.mypurecloud.ie"),
    ("eu-west-2", "https://api.euw2.pure.cloud"),
    ("ap-south-1", "https://api.aps1.pure.cloud"),
    ("ap-northeast-1", "https://api.mypurecloud.jp"),
    ("ap-northeast-2", "https://api.apne2.pure.cloud"),
    ("ap-northeast-3", "https://api.apne3.pure.cloud"),
    ("ap-southeast-2", "https://api.mypurecloud.com.au"),
    ("me-central-1", "https://api.mec1.pure.cloud"),
];

pub fn region_base_url(region: &str) -> Option<&'static str> {
    REGIONS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(region))
        .map(|(_, url)| *url)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub access_token: String,
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

fn string_setting(config: &DynamicValue, attribute: &str, env: &str) -> Option<String> {
    config
        .get_optional_string(&AttributePath::new(attribute))
        .ok()
        .flatten()
        .filter(|value| !value.is_empty())
        .or_else(|| std::env::var(env).ok().filter(|value| !value.is_empty()))
}

impl ProviderConfig {
    /// Resolve settings, reporting every problem at once
    pub fn from_config(config: &DynamicValue) -> Result<Self, Diagnostics> {
        let mut diags = Diagnostics::new();

        let access_token = string_setting(config, "access_token", ACCESS_TOKEN_ENV);
        if access_token.is_none() {
            diags.add_error(
                format!(
                    "access_token is required (set in provider config or {} env var)",
                    ACCESS_TOKEN_ENV
                ),
                None::<String>,
            );
        }

        let base_url = match string_setting(config, "api_url", API_URL_ENV) {
            Some(api_url) => match url::Url::parse(&api_url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(api_url),
                Ok(parsed) => {
                    diags.add_error(
                        format!("api_url must be http or https, got {}", parsed.scheme()),
                        None::<String>,
                    );
                    None
                }
                Err(e) => {
                    diags.add_error(
                        format!("api_url is not a valid URL: {}", e),
                        Some(api_url),
                    );
                    None
                }
            },
            None => {
                let region = string_setting(config, "aws_region", REGION_ENV)
                    .unwrap_or_else(|| DEFAULT_REGION.to_string());
                let base_url = region_base_url(&region);
                if base_url.is_none() {
                    diags.add_error(
                        format!("unknown region {}", region),
                        Some(format!(
                            "expected one of {}",
                            REGIONS
                                .iter()
                                .map(|(name, _)| *name)
                                .collect::<Vec<_>>()
                                .join(", ")
                        )),
                    );
                }
                base_url.map(str::to_string)
            }
        };

        let request_timeout_seconds = match config
            .get_optional_number(&AttributePath::new("request_timeout_seconds"))
            .ok()
            .flatten()
        {
            Some(seconds) if seconds >= 1.0 => seconds as u64,
            Some(seconds) => {
                diags.add_error(
                    "request_timeout_seconds must be at least 1",
                    Some(format!("Got {}", seconds)),
                );
                DEFAULT_REQUEST_TIMEOUT_SECONDS
            }
            None => match std::env::var(REQUEST_TIMEOUT_ENV) {
                Ok(value) => value.parse::<u64>().unwrap_or_else(|_| {
                    diags.add_error(
                        format!("{} must be a whole number of seconds", REQUEST_TIMEOUT_ENV),
                        Some(format!("Got '{}'", value)),
                    );
                    DEFAULT_REQUEST_TIMEOUT_SECONDS
                }),
                Err(_) => DEFAULT_REQUEST_TIMEOUT_SECONDS,
            },
        };

        match (access_token, base_url) {
            (Some(access_token), Some(base_url)) if !diags.has_errors() => Ok(Self {
                access_token,
                base_url,
                request_timeout_seconds,
            }),
            _ => Err(diags),
        }
    }
}
