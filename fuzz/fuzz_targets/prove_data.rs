// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

#![no_main]

use ipa_pdp::prove_data::{ProveData, SectorProveData};
use libfuzzer_sys::fuzz_target;

// Envelopes decode only from their canonical encoding
fuzz_target!(|data: &[u8]| {
	if let Ok(prove_data) = ProveData::from_bytes(data) {
		assert_eq!(&prove_data.to_bytes(), data);
	}
	if let Ok(prove_data) = SectorProveData::from_bytes(data) {
		assert_eq!(&prove_data.to_bytes(), data);
	}
});
