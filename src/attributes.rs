//! Node attribute codec: the generic `MEGA{...}` JSON blob every node
//! carries, plus the packed binary media attributes (`8`/`9`) video/audio
//! files carry alongside it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{Error, Result};

const MARKER: &[u8] = b"MEGA";

/// The decrypted attribute map for a node. `name` is the only field MEGA
/// requires; everything else is optional and, critically, must be
/// preserved verbatim when a node is re-encrypted (e.g. during a folder
/// import) unless the caller explicitly asks to clear it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeAttributes {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "t", skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
    #[serde(rename = "lbl", skip_serializing_if = "Option::is_none")]
    pub label: Option<u8>,
    #[serde(rename = "fav", skip_serializing_if = "Option::is_none")]
    pub favorite: Option<u8>,
    #[serde(rename = "c", skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(rename = "e", skip_serializing_if = "Option::is_none")]
    pub custom: Option<HashMap<String, String>>,
    /// Fields this crate doesn't model explicitly (e.g. `s4`, `sen`, `rr`)
    /// but must still round-trip unless the caller clears them.
    #[serde(flatten)]
    pub extra: HashMap<String, json::Value>,
}

impl NodeAttributes {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Drops fields that shouldn't survive a folder import/copy: share
    /// labels and favorite flags are per-user-tree state, and `rr` (restore
    /// reference) never makes sense pointing at a different subtree.
    pub fn cleared_for_import(mut self) -> Self {
        self.label = None;
        self.favorite = None;
        self.extra.remove("s4");
        self.extra.remove("sen");
        self.extra.remove("rr");
        self
    }

    /// Decrypts and unpacks an attribute blob: base64url-decode, AES-CBC
    /// decrypt under a zero IV with the node's 16-byte AES key, strip the
    /// `MEGA` marker and trailing zero padding, then parse as JSON.
    pub fn decrypt_and_unpack(node_aes_key: &[u8], encoded: &str) -> Result<Self> {
        let mut buffer = crypto::base64url_decode(encoded)?;
        if buffer.len() % 16 != 0 {
            return Err(Error::InvalidResponseFormat);
        }

        crypto::aes_cbc_zero_iv_decrypt_in_place(node_aes_key, &mut buffer);

        if buffer.len() < MARKER.len() || &buffer[..MARKER.len()] != MARKER {
            return Err(Error::InvalidResponseFormat);
        }

        let content_len = buffer.iter().take_while(|b| **b != 0).count();
        let attrs = json::from_slice(&buffer[MARKER.len()..content_len])?;
        Ok(attrs)
    }

    /// Packs and encrypts this attribute map the way `decrypt_and_unpack`
    /// expects to read it back: `MEGA` marker, JSON, zero-padded to a
    /// 16-byte boundary, AES-CBC encrypted under a zero IV.
    pub fn pack_and_encrypt(&self, node_aes_key: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = MARKER.to_vec();
        json::to_writer(&mut buffer, self)?;

        let padding_len = (16 - buffer.len() % 16) % 16;
        buffer.extend(std::iter::repeat(0u8).take(padding_len));

        crypto::aes_cbc_zero_iv_encrypt_in_place(node_aes_key, &mut buffer);
        Ok(buffer)
    }
}

/// Decoded media metadata (MEGA attributes `8` and `9`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub playtime_secs: u32,
    pub shortformat: u8,
    /// Only meaningful when `shortformat == 0`: explicit container/codec ids
    /// looked up via the `mc` command's table.
    pub codecs: Option<(u8, u16, u16)>,
}

fn pack_escaped(value: u32, field_bits: u32, divisor: u32) -> u32 {
    let field_size = 1u32 << field_bits;
    let mut v = value << 1;
    if value >= field_size {
        v = ((value / divisor.max(1)) << 1) | 1;
    }
    v & (field_size - 1)
}

fn unpack_escaped(packed: u32, field_bits: u32, divisor: u32) -> u32 {
    let escaped = packed & 1 != 0;
    let v = packed >> 1;
    if escaped { v * divisor.max(1) } else { v }
}

impl MediaInfo {
    /// Derives the XXTEA key for a file's media attributes from its 32-byte
    /// file key: reinterpret the key as `u32[8]` in **big-endian** word
    /// order, then take the last 4 words. Getting the endianness backwards
    /// here silently produces garbage instead of an error.
    pub fn xxtea_key(file_key_32: &[u8; 32]) -> Result<[u32; 4]> {
        let mut words = [0u32; 8];
        for (i, chunk) in file_key_32.chunks_exact(4).enumerate() {
            words[i] = crypto::be_bytes_to_u32(chunk)?;
        }
        Ok([words[4], words[5], words[6], words[7]])
    }

    /// Decodes attribute `8` (and, if present, attribute `9`) from their
    /// `N*<base64url>` wire form.
    pub fn decode(attr8: &str, attr9: Option<&str>, key: &[u32; 4]) -> Result<Self> {
        let payload = decode_prefixed_payload(attr8, b'8')?;
        let plain = crate::crypto::xxtea::decrypt_payload(&payload, key);
        let packed = u64::from_le_bytes(plain);

        let width = unpack_escaped((packed & 0x7FFF) as u32, 15, 2);
        let height = unpack_escaped(((packed >> 15) & 0x7FFF) as u32, 15, 2);
        let fps = unpack_escaped(((packed >> 30) & 0xFF) as u32, 8, 2);
        let playtime = unpack_escaped(((packed >> 38) & 0x3FFFF) as u32, 18, 60);
        let shortformat = ((packed >> 56) & 0xFF) as u8;

        let codecs = if shortformat == 0 {
            if let Some(attr9) = attr9 {
                let payload9 = decode_prefixed_payload(attr9, b'9')?;
                let plain9 = crate::crypto::xxtea::decrypt_payload(&payload9, key);
                let packed9 = u32::from_le_bytes(plain9[0..4].try_into().unwrap());
                let container = (packed9 & 0xFF) as u8;
                let video_codec = ((packed9 >> 8) & 0xFFF) as u16;
                let audio_codec = ((packed9 >> 20) & 0xFFF) as u16;
                Some((container, video_codec, audio_codec))
            } else {
                None
            }
        } else {
            None
        };

        Ok(Self {
            width,
            height,
            fps,
            playtime_secs: playtime,
            shortformat,
            codecs,
        })
    }

    /// Encodes this media info into wire-form `8*<base64url>` (and, when
    /// `shortformat == 0` and codecs are present, `9*<base64url>`) strings.
    pub fn encode(&self, key: &[u32; 4]) -> Result<(String, Option<String>)> {
        let width = pack_escaped(self.width, 15, 2) as u64;
        let height = pack_escaped(self.height, 15, 2) as u64;
        let fps = pack_escaped(self.fps, 8, 2) as u64;
        let playtime = pack_escaped(self.playtime_secs, 18, 60) as u64;
        let shortformat = self.shortformat as u64;

        let packed = width | (height << 15) | (fps << 30) | (playtime << 38) | (shortformat << 56);
        let plain = packed.to_le_bytes();
        let encrypted = crate::crypto::xxtea::encrypt_payload(&plain, key);
        let attr8 = format!("8*{}", crypto::base64url_encode(encrypted));

        let attr9 = if self.shortformat == 0 {
            self.codecs.map(|(container, video, audio)| {
                let packed9 = (container as u32) | ((video as u32 & 0xFFF) << 8) | ((audio as u32 & 0xFFF) << 20);
                let mut plain9 = [0u8; 8];
                plain9[0..4].copy_from_slice(&packed9.to_le_bytes());
                let encrypted9 = crate::crypto::xxtea::encrypt_payload(&plain9, key);
                format!("9*{}", crypto::base64url_encode(encrypted9))
            })
        } else {
            None
        };

        Ok((attr8, attr9))
    }

    /// Resolves this info's codec id triple (when present) into strings via
    /// `table`. Returns `None` when `codecs` is unset (e.g. `shortformat`
    /// already names a known container/codec combination directly).
    pub fn resolve_codec_strings<'a>(&self, table: &'a MediaCodecTable) -> Option<(Option<&'a str>, Option<&'a str>, Option<&'a str>)> {
        self.codecs.map(|(container, video, audio)| table.resolve(container, video, audio))
    }
}

/// The `mc` command's id-to-string codec lookup table: container ids index
/// into `containers`, video codec ids into `video_codecs`, audio codec ids
/// into `audio_codecs`.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCodecTable {
    pub containers: Vec<String>,
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
}

impl MediaCodecTable {
    pub fn from_lists(containers: Vec<String>, video_codecs: Vec<String>, audio_codecs: Vec<String>) -> Self {
        Self { containers, video_codecs, audio_codecs }
    }

    /// Resolves a (container, video, audio) id triple into their string
    /// names. An id past the end of its list resolves to `None` for that
    /// slot rather than erroring, since MEGA's table only grows over time.
    pub fn resolve(&self, container: u8, video: u16, audio: u16) -> (Option<&str>, Option<&str>, Option<&str>) {
        (
            self.containers.get(container as usize).map(String::as_str),
            self.video_codecs.get(video as usize).map(String::as_str),
            self.audio_codecs.get(audio as usize).map(String::as_str),
        )
    }
}

impl Default for MediaCodecTable {
    /// A built-in fallback covering the commonly-seen ids, for callers that
    /// don't want to round-trip a `Request::MediaCodecs` fetch just to
    /// resolve a handful of common formats.
    fn default() -> Self {
        Self {
            containers: ["mp4", "m4v", "mov", "mkv", "webm", "avi", "flv"]
                .into_iter()
                .map(String::from)
                .collect(),
            video_codecs: ["avc1", "hevc", "vp8", "vp9", "av1"]
                .into_iter()
                .map(String::from)
                .collect(),
            audio_codecs: ["mp4a-40-2", "mp3", "opus", "vorbis", "flac"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

fn decode_prefixed_payload(attr: &str, expected_prefix: u8) -> Result<[u8; 8]> {
    let (prefix, encoded) = attr
        .split_once('*')
        .ok_or(Error::InvalidResponseFormat)?;

    if prefix.as_bytes() != [expected_prefix] {
        return Err(Error::InvalidResponseFormat);
    }

    let bytes = crypto::base64url_decode(encoded)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidResponseFormat)
}

/// Fingerprint (`c` attribute): CRC32 segments of the file's content,
/// concatenated with a serialized mtime, base64url-encoded.
pub fn fingerprint(content_crc32_segments: &[u32; 4], mtime: u64) -> String {
    let mut buffer = Vec::with_capacity(16 + 4);
    for segment in content_crc32_segments {
        buffer.extend_from_slice(&segment.to_be_bytes());
    }

    // MEGA serializes the mtime as the smallest big-endian run that holds it.
    let mtime_bytes = mtime.to_be_bytes();
    let first_nonzero = mtime_bytes.iter().position(|b| *b != 0).unwrap_or(7);
    buffer.extend_from_slice(&mtime_bytes[first_nonzero..]);

    crypto::base64url_encode(buffer)
}

/// Computes the four CRC32 segments MEGA derives from a file's content:
/// the file is split into (up to) 4 equal spans and each is CRC32-summed.
pub fn crc32_segments(data_len: u64, mut read_span: impl FnMut(u64, u64) -> Vec<u8>) -> [u32; 4] {
    const SEGMENTS: u64 = 4;
    let span = (data_len / SEGMENTS).max(1);

    let mut out = [0u32; 4];
    for (i, slot) in out.iter_mut().enumerate() {
        let start = i as u64 * span;
        if start >= data_len {
            break;
        }
        let len = if i as u64 == SEGMENTS - 1 {
            data_len - start
        } else {
            span
        };

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&read_span(start, len));
        *slot = hasher.finalize();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_round_trip_preserves_name_and_extra_fields() {
        let key = [0u8; 16];
        let attrs = NodeAttributes {
            name: "report.pdf".to_string(),
            mtime: Some(1_700_000_000),
            label: Some(2),
            favorite: Some(1),
            fingerprint: Some("abc123".to_string()),
            custom: None,
            extra: HashMap::new(),
        };

        let packed = attrs.pack_and_encrypt(&key).unwrap();
        let encoded = crypto::base64url_encode(&packed);
        let decoded = NodeAttributes::decrypt_and_unpack(&key, &encoded).unwrap();

        assert_eq!(decoded, attrs);
    }

    #[test]
    fn cleared_for_import_drops_share_local_state() {
        let mut extra = HashMap::new();
        extra.insert("rr".to_string(), json::Value::String("H1".to_string()));

        let attrs = NodeAttributes {
            name: "photo.jpg".to_string(),
            label: Some(3),
            favorite: Some(1),
            extra,
            ..Default::default()
        };

        let cleared = attrs.cleared_for_import();
        assert!(cleared.label.is_none());
        assert!(cleared.favorite.is_none());
        assert!(!cleared.extra.contains_key("rr"));
        assert_eq!(cleared.name, "photo.jpg");
    }

    #[test]
    fn media_info_round_trips_through_encode_decode() {
        let key = [0x10111213u32, 0x14151617, 0x18191A1B, 0x1C1D1E1F];
        let info = MediaInfo {
            width: 1920,
            height: 1080,
            fps: 30,
            playtime_secs: 125,
            shortformat: 0,
            codecs: Some((1, 0x100, 0x200)),
        };

        let (attr8, attr9) = info.encode(&key).unwrap();
        let decoded = MediaInfo::decode(&attr8, attr9.as_deref(), &key).unwrap();

        assert_eq!(decoded, info);
    }

    #[test]
    fn decodes_literal_attr8_vector() {
        let key = [0x10111213u32, 0x14151617, 0x18191A1B, 0x1C1D1E1F];
        let decoded = MediaInfo::decode("8*bPgnl_qES_0", None, &key).unwrap();

        assert_eq!(decoded.width, 852);
        assert_eq!(decoded.height, 480);
        assert_eq!(decoded.fps, 30);
        assert_eq!(decoded.playtime_secs, 4);
    }

    #[test]
    fn codec_table_resolves_known_ids_and_none_past_the_end() {
        let table = MediaCodecTable::default();
        let info = MediaInfo {
            codecs: Some((0, 1, 2)),
            ..Default::default()
        };

        let (container, video, audio) = info.resolve_codec_strings(&table).unwrap();
        assert_eq!(container, Some("mp4"));
        assert_eq!(video, Some("hevc"));
        assert_eq!(audio, Some("opus"));

        let out_of_range = MediaInfo {
            codecs: Some((0, 999, 2)),
            ..Default::default()
        };
        let (_, video, _) = out_of_range.resolve_codec_strings(&table).unwrap();
        assert_eq!(video, None);
    }

    #[test]
    fn media_info_without_codecs_when_shortformat_nonzero() {
        let key = [1u32, 2, 3, 4];
        let info = MediaInfo {
            width: 640,
            height: 480,
            fps: 25,
            playtime_secs: 10,
            shortformat: 5,
            codecs: None,
        };

        let (attr8, attr9) = info.encode(&key).unwrap();
        assert!(attr9.is_none());

        let decoded = MediaInfo::decode(&attr8, None, &key).unwrap();
        assert_eq!(decoded.shortformat, 5);
        assert_eq!(decoded.width, 640);
        assert_eq!(decoded.codecs, None);
    }
}
