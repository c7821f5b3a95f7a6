// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use serde::{Deserialize, Serialize};

/// HTML bodies for outgoing mail, picked by `template` in config.toml.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTemplate {
    #[default]
    ExchangeRates,
    /// Generic report cover note.
    Report,
}

impl MessageTemplate {
    pub fn render(&self, signature: &str) -> String {
        let intro = match self {
            MessageTemplate::ExchangeRates => {
                "<p>Please find the charts of the latest currency exchange rates.</p>"
            }
            MessageTemplate::Report => {
                "<p>Please find the attached report.</p>\n<br />\n\
                 <p>Contact us directly if you have any questions.</p>"
            }
        };

        format!(
            r#"<html>
<body>
<p>Hi,</p>
{intro}
<br />
<p>Thank you!</p>
<br />
<p>Cheers,<br />
{signature}</p>
<br />
<p style="color:red;">
Please do not reply to this email as it is auto-generated.
</p>
</body>
</html>
"#,
            intro = intro,
            signature = escape_html(signature),
        )
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
