// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local broker options.

use std::time::Duration;

use rumqttc::MqttOptions;

use super::LocalConfig;
use crate::error::TransportError;

pub(super) fn client_id() -> String {
    format!("applink_{}", uuid::Uuid::new_v4().simple())
}

/// Builds plain TCP options authenticated with the serial and credential.
pub(super) fn mqtt_options(
    config: &LocalConfig,
    keep_alive: Duration,
) -> Result<MqttOptions, TransportError> {
    if config.host.trim().is_empty() {
        return Err(TransportError::InvalidAddress(
            "local broker host is required".to_string(),
        ));
    }

    let mut options = MqttOptions::new(client_id(), config.host.trim(), config.port);
    options.set_keep_alive(keep_alive);
    options.set_clean_session(true);
    options.set_credentials(&config.username, &config.password);

    tracing::debug!(
        host = %config.host,
        port = config.port,
        "Prepared local MQTT options"
    );
    Ok(options)
}
