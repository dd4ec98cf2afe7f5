// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `sensor_msgs` message types.

use serde::{Deserialize, Serialize};

use super::std_msgs::Header;
use super::ByteArray;

/// Encoded camera frame (`format` is e.g. `"jpeg"` or `"png"`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedImage {
    pub header: Header,
    pub format: String,
    pub data: ByteArray,
}

crate::binary_struct!(CompressedImage {
    header,
    format,
    data
});
