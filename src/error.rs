// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the rate pipeline

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised while loading, rebasing and mailing exchange rates
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Rate source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Malformed rate data: {0}")]
    MalformedData(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Invalid {currency} rate on {date}: {reason}")]
    InvalidBaseRate {
        currency: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("Base currency {0} cannot also be watched")]
    BaseCurrencyWatched(String),

    #[error("Attachment not found: {0}")]
    AttachmentMissing(String),

    #[error("Unsupported attachment: {0}")]
    UnsupportedAttachment(String),

    #[error("Delivery to {recipient} failed: {reason}")]
    RecipientDeliveryFailure { recipient: String, reason: String },

    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid email address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Could not compose email: {0}")]
    Compose(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
