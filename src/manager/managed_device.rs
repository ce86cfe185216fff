// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Internal device wrapper for the device manager.

use std::sync::Arc;

use crate::device::Device;
use crate::error::Result;
use crate::transport::{Connector, DeviceCredentials};
use crate::types::{ConnectionPolicy, ConnectionStatus};

/// A registered device with what it needs to (re)connect.
pub(crate) struct ManagedDevice<C: Connector> {
    pub device: Arc<Device<C>>,
    pub policy: ConnectionPolicy,
    pub credentials: DeviceCredentials,
}

impl<C: Connector> Clone for ManagedDevice<C> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
            policy: self.policy,
            credentials: self.credentials.clone(),
        }
    }
}

impl<C: Connector> ManagedDevice<C> {
    pub fn new(device: Device<C>, policy: ConnectionPolicy, credentials: DeviceCredentials) -> Self {
        Self {
            device: Arc::new(device),
            policy,
            credentials,
        }
    }

    pub async fn connect(&self) -> Result<ConnectionStatus> {
        self.device
            .connect(self.policy, self.credentials.clone())
            .await
    }
}
