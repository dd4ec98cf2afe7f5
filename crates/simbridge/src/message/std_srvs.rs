// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `std_srvs` request and response types.
//!
//! `Empty` is both the request and the response of `std_srvs/Empty`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBool {
    pub data: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBoolResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

crate::binary_struct!(Empty {});
crate::binary_struct!(SetBool { data });
crate::binary_struct!(SetBoolResponse { success, message });
crate::binary_struct!(Trigger {});
crate::binary_struct!(TriggerResponse { success, message });
