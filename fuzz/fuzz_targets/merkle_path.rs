// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

#![no_main]

use ipa_pdp::merkle::{verify_merkle_path, MerklePath};
use libfuzzer_sys::fuzz_target;

// Arbitrary paths decode canonically and never verify against an unrelated root
fuzz_target!(|data: &[u8]| {
	if let Ok(path) = MerklePath::from_bytes(data) {
		assert_eq!(&path.to_bytes(), data);
		assert!(verify_merkle_path(&path, 0, b"fuzz", &[0u8; 32]).is_err());
	}
});
