// Text format of the UDP discovery beacon.
//
// A host advertises itself with a single datagram:
//
//     MAGIC|playerCount|port|label
//
// `port` is the host's TCP session port (the datagram's source port is an
// ephemeral one and means nothing). The label is everything after the third
// separator, so it may itself contain `|`. Anything that does not parse is
// noise from some other program on the LAN and is ignored, never reported.

/// Magic prefix shared by hosts and listeners of the same game.
pub const DEFAULT_MAGIC: &str = "SML";

/// One parsed beacon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeaconMessage {
    pub player_count: u32,
    pub port: u16,
    pub label: String,
}

impl BeaconMessage {
    /// Render the datagram text.
    pub fn encode(&self, magic: &str) -> String {
        format!("{magic}|{}|{}|{}", self.player_count, self.port, self.label)
    }

    /// Parse datagram text. Returns `None` for a wrong magic, missing fields,
    /// or non-numeric count/port.
    pub fn parse(text: &str, magic: &str) -> Option<Self> {
        let mut fields = text.trim().splitn(4, '|');
        if fields.next()? != magic {
            return None;
        }
        let player_count = fields.next()?.trim().parse().ok()?;
        let port = fields.next()?.trim().parse().ok()?;
        let label = fields.next()?.to_string();
        Some(Self {
            player_count,
            port,
            label,
        })
    }

    /// Parse a raw datagram; non-UTF-8 bytes are noise.
    pub fn parse_datagram(bytes: &[u8], magic: &str) -> Option<Self> {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|text| Self::parse(text, magic))
    }
}
