// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud proxy options.
//!
//! The proxy speaks MQTT over WebSocket on port 443 and authenticates the
//! session with a custom authorizer. The token and its signature travel as
//! URL query parameters rather than MQTT username/password:
//!
//! ```text
//! wss://{endpoint}:443/mqtt?x-amz-customauthorizer-name={authorizer}&{token_key}={token}&x-amz-customauthorizer-signature={signature}
//! ```

use std::time::Duration;

use rumqttc::{MqttOptions, Transport};

use super::CloudConfig;
use crate::error::TransportError;

const CLOUD_PORT: u16 = 443;
const SUPPORTED_BROKER_TYPE: &str = "wss";

/// Builds the WebSocket URL, including authorizer query parameters.
pub(super) fn broker_url(config: &CloudConfig) -> String {
    format!(
        "wss://{endpoint}:{CLOUD_PORT}/mqtt?x-amz-customauthorizer-name={authorizer}&{key}={token}&x-amz-customauthorizer-signature={signature}",
        endpoint = config.endpoint.trim(),
        authorizer = urlencoding::encode(&config.authorizer_name),
        key = urlencoding::encode(&config.token_key),
        token = urlencoding::encode(&config.token_value),
        signature = urlencoding::encode(&config.token_signature),
    )
}

/// Builds WSS options using the system trust roots.
pub(super) fn mqtt_options(
    config: &CloudConfig,
    keep_alive: Duration,
) -> Result<MqttOptions, TransportError> {
    if !config.broker_type.eq_ignore_ascii_case(SUPPORTED_BROKER_TYPE) {
        return Err(TransportError::Unsupported(format!(
            "cloud broker type `{}`",
            config.broker_type
        )));
    }
    if config.endpoint.trim().is_empty() {
        return Err(TransportError::InvalidAddress(
            "cloud endpoint is required".to_string(),
        ));
    }
    if config.client_id.is_empty() || config.client_id.starts_with(' ') {
        return Err(TransportError::InvalidAddress(format!(
            "invalid cloud client id `{}`",
            config.client_id
        )));
    }

    let mut options = MqttOptions::new(&config.client_id, broker_url(config), CLOUD_PORT);
    options.set_transport(Transport::wss_with_default_config());
    options.set_keep_alive(keep_alive);
    options.set_clean_session(true);

    tracing::debug!(
        endpoint = %config.endpoint,
        client_id = %config.client_id,
        "Prepared cloud MQTT options"
    );
    Ok(options)
}
