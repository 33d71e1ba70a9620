// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use thiserror::Error;

/// Errors surfaced by the dispatcher. None of them is fatal: the store is
/// always left consistent when one is returned.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("unknown config digest: {0}")]
    UnknownDigest(String),
    #[error("unknown check id: {0}")]
    UnknownCheck(String),
    #[error("could not patch instance {index} of check {check}: {source}")]
    PatcherFailure {
        check: String,
        index: usize,
        #[source]
        source: DataError,
    },
}

/// Errors raised while manipulating an instance payload.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("invalid YAML payload: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("payload is not a YAML mapping")]
    NotAMapping,
    #[error("`tags` is not a list of strings")]
    InvalidTags,
}
