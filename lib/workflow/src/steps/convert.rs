//! Conversion steps between users, channels, ids and message references.

use crate::error::StepError;
use crate::step::{
    DataType, IoSpec, StepContext, StepFunction, StepOutcome, StepRegistryBuilder, StepSpec,
};
use crate::token::user_mention;
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A serialized reference to a posted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    /// Channel the message is in.
    pub channel: String,
    /// Message timestamp.
    pub ts: String,
}

impl MessageRef {
    fn parse(raw: &str) -> Result<Self, Report<StepError>> {
        Ok(serde_json::from_str(raw).map_err(|e| StepError::InvalidInput {
            input: "message".to_string(),
            reason: e.to_string(),
        })?)
    }
}

#[derive(Debug, Clone, Copy)]
enum Convert {
    Identity,
    UserToPing,
    MessageToTs,
    MessageToChannel,
    ChannelTsToMessage,
}

fn input<'a>(inputs: &'a BTreeMap<String, String>, key: &str) -> &'a str {
    inputs.get(key).map(String::as_str).unwrap_or_default()
}

#[async_trait]
impl StepFunction for Convert {
    async fn run(
        &self,
        _ctx: &StepContext,
        inputs: &BTreeMap<String, String>,
    ) -> Result<StepOutcome, Report<StepError>> {
        Ok(match self {
            Self::Identity => StepOutcome::single("value", input(inputs, "value")),
            Self::UserToPing => StepOutcome::single("value", user_mention(input(inputs, "value"))),
            Self::MessageToTs => StepOutcome::single("ts", MessageRef::parse(input(inputs, "message"))?.ts),
            Self::MessageToChannel => {
                StepOutcome::single("channel", MessageRef::parse(input(inputs, "message"))?.channel)
            }
            Self::ChannelTsToMessage => {
                let message = MessageRef {
                    channel: input(inputs, "channel").to_string(),
                    ts: input(inputs, "ts").to_string(),
                };
                let raw = serde_json::to_string(&message).map_err(|e| StepError::Failed {
                    reason: e.to_string(),
                })?;
                StepOutcome::single("message", raw)
            }
        })
    }
}

pub(super) fn register(builder: StepRegistryBuilder) -> StepRegistryBuilder {
    const CATEGORY: &str = "Convert";
    builder
        .register(
            "convert-user-to-id",
            StepSpec::new("Convert user to user ID", CATEGORY)
                .input(IoSpec::required("value", "User", DataType::User))
                .output(IoSpec::required("value", "User ID", DataType::Text)),
            Convert::Identity,
        )
        .register(
            "convert-user-to-ping",
            StepSpec::new("Convert user to @user", CATEGORY)
                .input(IoSpec::required("value", "User", DataType::User))
                .output(IoSpec::required("value", "@user mention", DataType::Text)),
            Convert::UserToPing,
        )
        .register(
            "convert-user-id-to-user",
            StepSpec::new("Convert user ID to user", CATEGORY)
                .input(
                    IoSpec::required("value", "User ID", DataType::User).describe(
                        "It is your responsibility to ensure this is a valid user ID. Otherwise, later steps that use this user may fail.",
                    ),
                )
                .output(IoSpec::required("value", "User", DataType::User)),
            Convert::Identity,
        )
        .register(
            "convert-channel-to-id",
            StepSpec::new("Convert channel to channel ID", CATEGORY)
                .input(IoSpec::required("value", "Channel", DataType::Channel))
                .output(IoSpec::required("value", "Channel ID", DataType::Text)),
            Convert::Identity,
        )
        .register(
            "convert-id-to-channel",
            StepSpec::new("Convert channel ID to channel", CATEGORY)
                .input(
                    IoSpec::required("value", "Channel ID", DataType::Text).describe(
                        "It is your responsibility to ensure this is a valid channel ID. Otherwise, later steps that use this channel may fail.",
                    ),
                )
                .output(IoSpec::required("value", "Channel", DataType::Channel)),
            Convert::Identity,
        )
        .register(
            "convert-message-to-ts",
            StepSpec::new("Get timestamp from message", CATEGORY)
                .input(IoSpec::required("message", "Message", DataType::Message))
                .output(IoSpec::required("ts", "Timestamp", DataType::Text)),
            Convert::MessageToTs,
        )
        .register(
            "convert-message-to-channel",
            StepSpec::new("Get channel from message", CATEGORY)
                .input(IoSpec::required("message", "Message", DataType::Message))
                .output(IoSpec::required("channel", "Channel", DataType::Channel)),
            Convert::MessageToChannel,
        )
        .register(
            "convert-channel-ts-to-message",
            StepSpec::new("Get message from channel and timestamp", CATEGORY)
                .input(
                    IoSpec::required("channel", "Channel", DataType::Channel).describe(
                        "It is your responsibility to ensure the channel and timestamp are correct. Otherwise, later steps that use this message may fail.",
                    ),
                )
                .input(IoSpec::required("ts", "Timestamp", DataType::Text))
                .output(IoSpec::required("message", "Message", DataType::Message)),
            Convert::ChannelTsToMessage,
        )
}
