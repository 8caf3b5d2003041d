// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

// Envelope labels, shared by signature and encryption containers
pub const ALGORITHM_LABEL: i64 = 1;
pub const CUSTOM_DATA_LABEL: i64 = 2;
pub const KEY_ID_LABEL: i64 = 3;
pub const PUBLIC_KEY_LABEL: i64 = 4;
pub const SIGNATURE_LABEL: i64 = 6;
pub const EPHEMERAL_KEY_LABEL: i64 = 7;
pub const KEY_ENCRYPTION_LABEL: i64 = 8;
pub const TAG_LABEL: i64 = 9;
pub const IV_LABEL: i64 = 10;
pub const CIPHER_TEXT_LABEL: i64 = 11;

// RFC 9052 key labels
pub const COSE_KTY_LABEL: i64 = 1;

pub const COSE_OKP_KTY: i64 = 1;
pub const COSE_EC2_KTY: i64 = 2;
pub const COSE_RSA_KTY: i64 = 3;

pub const COSE_RSA_N_LABEL: i64 = -1;
pub const COSE_RSA_E_LABEL: i64 = -2;

pub const COSE_EC2_CRV_LABEL: i64 = -1;
pub const COSE_EC2_X_LABEL: i64 = -2;
pub const COSE_EC2_Y_LABEL: i64 = -3;

pub const COSE_OKP_CRV_LABEL: i64 = -1;
pub const COSE_OKP_X_LABEL: i64 = -2;

pub const COSE_CRV_P256: i64 = 1;
pub const COSE_CRV_P384: i64 = 2;
pub const COSE_CRV_P521: i64 = 3;
pub const COSE_CRV_X25519: i64 = 4;
pub const COSE_CRV_X448: i64 = 5;
pub const COSE_CRV_ED25519: i64 = 6;
pub const COSE_CRV_ED448: i64 = 7;

/// CBOR object type identifier: `1010(["type-id", {...}])`
pub const COTX_TAG: u64 = 1010;
