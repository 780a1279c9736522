//! Magic-byte content sniffing.

use ffbox_models::MediaKind;

/// Bytes needed to classify every supported container.
pub const SNIFF_LEN: usize = 16;

/// Classify file content as video or audio from its leading bytes.
///
/// Returns `None` when the signature is unknown or ambiguous (e.g. ASF, which
/// carries both WMV and WMA), leaving the decision to the extension.
pub fn sniff_media_kind(data: &[u8]) -> Option<MediaKind> {
    if data.len() < 4 {
        return None;
    }

    // ISO BMFF: ....ftyp<brand>
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return match &data[8..12] {
            b"M4A " | b"M4B " | b"M4P " | b"F4A " | b"F4B " => Some(MediaKind::Audio),
            _ => Some(MediaKind::Video),
        };
    }
    // Old QuickTime without ftyp
    if data.len() >= 8 && matches!(&data[4..8], b"moov" | b"mdat" | b"wide" | b"free") {
        return Some(MediaKind::Video);
    }

    // Matroska / WebM: EBML header
    if data[..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        return Some(MediaKind::Video);
    }

    // RIFF: WAVE or AVI
    if data.len() >= 12 && &data[..4] == b"RIFF" {
        return match &data[8..12] {
            b"WAVE" => Some(MediaKind::Audio),
            b"AVI " => Some(MediaKind::Video),
            _ => None,
        };
    }

    if &data[..3] == b"FLV" {
        return Some(MediaKind::Video);
    }
    // MPEG program stream
    if data[..4] == [0x00, 0x00, 0x01, 0xBA] {
        return Some(MediaKind::Video);
    }

    if &data[..4] == b"OggS" || &data[..4] == b"fLaC" || &data[..3] == b"ID3" {
        return Some(MediaKind::Audio);
    }
    // MPEG audio frame sync or ADTS AAC
    if data[0] == 0xFF && (data[1] & 0xE0) == 0xE0 {
        return Some(MediaKind::Audio);
    }

    None
}
