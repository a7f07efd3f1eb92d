//! Video codec selection
//!
//! Orders the receiver codec capability list before the answer is generated,
//! biasing negotiation toward the preferred codec for the offering platform.
//! Ordering is irrevocable once the answer exists, so this runs first.

use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_VP8, MIME_TYPE_VP9};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters};

use crate::signaling::PlatformHint;

/// Retransmission/FEC pseudo-codecs that must never be offered as primary
const BLOCKED_MIME_TYPES: [&str; 3] = ["video/red", "video/ulpfec", "video/rtx"];

const H264_FMTP_PREFIX: &str = "level-asymmetry-allowed=1;packetization-mode=1;";
const H264_FMTP_LINE: &str =
    "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";
const VP9_FMTP_LINE: &str = "profile-id=0";

/// Preferred codec for a given offering platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecPreference {
    /// Preferred mime type
    pub mime_type: &'static str,
    /// Fmtp prefix any acceptable variant must carry
    pub fmtp_prefix: &'static str,
    /// Exact fmtp line of the single best variant
    pub fmtp_line: &'static str,
}

impl CodecPreference {
    /// H.264 by default; VP9 on Macs, whose hardware H.264 encode has a
    /// color-accuracy issue.
    pub fn for_platform(hint: PlatformHint) -> Self {
        match hint {
            PlatformHint::Mac => Self {
                mime_type: MIME_TYPE_VP9,
                fmtp_prefix: "",
                fmtp_line: VP9_FMTP_LINE,
            },
            PlatformHint::Generic => Self {
                mime_type: MIME_TYPE_H264,
                fmtp_prefix: H264_FMTP_PREFIX,
                fmtp_line: H264_FMTP_LINE,
            },
        }
    }
}

fn video_codec(mime_type: &str, sdp_fmtp_line: &str) -> RTCRtpCodecParameters {
    RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: mime_type.to_string(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line: sdp_fmtp_line.to_string(),
            rtcp_feedback: vec![],
        },
        ..Default::default()
    }
}

/// The video codec capabilities this client can receive, mirroring the
/// engine's default registrations (including the pseudo-codecs selection
/// filters back out).
pub fn receiver_codec_capabilities() -> Vec<RTCRtpCodecParameters> {
    vec![
        video_codec(MIME_TYPE_VP8, ""),
        video_codec(
            MIME_TYPE_H264,
            "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f",
        ),
        video_codec(
            MIME_TYPE_H264,
            "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42001f",
        ),
        video_codec(MIME_TYPE_H264, H264_FMTP_LINE),
        video_codec(
            MIME_TYPE_H264,
            "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42e01f",
        ),
        video_codec(MIME_TYPE_VP9, "profile-id=0"),
        video_codec(MIME_TYPE_VP9, "profile-id=2"),
        video_codec("video/rtx", ""),
        video_codec("video/red", ""),
        video_codec("video/ulpfec", ""),
    ]
}

/// Order a codec capability list for the given preference.
///
/// Blocked pseudo-codecs are dropped; codecs whose mime type matches the
/// preference and whose fmtp line carries the preferred prefix move to the
/// front, preserving relative order within each partition; an exact
/// mime+fmtp match is then pulled to the very front.
pub fn order_codecs(
    codecs: Vec<RTCRtpCodecParameters>,
    preference: &CodecPreference,
) -> Vec<RTCRtpCodecParameters> {
    let mut preferred = Vec::new();
    let mut rest = Vec::new();

    for codec in codecs {
        let capability = &codec.capability;
        if BLOCKED_MIME_TYPES
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(&capability.mime_type))
        {
            continue;
        }
        if capability.mime_type == preference.mime_type
            && capability.sdp_fmtp_line.contains(preference.fmtp_prefix)
        {
            preferred.push(codec);
        } else {
            rest.push(codec);
        }
    }

    let mut ordered = preferred;
    ordered.extend(rest);

    if let Some(exact) = ordered.iter().position(|codec| {
        codec.capability.mime_type == preference.mime_type
            && codec.capability.sdp_fmtp_line == preference.fmtp_line
    }) {
        let best = ordered.remove(exact);
        ordered.insert(0, best);
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mime_types(codecs: &[RTCRtpCodecParameters]) -> Vec<String> {
        codecs
            .iter()
            .map(|c| c.capability.mime_type.clone())
            .collect()
    }

    #[test]
    fn test_blocked_mimes_never_appear() {
        let ordered = order_codecs(
            receiver_codec_capabilities(),
            &CodecPreference::for_platform(PlatformHint::Generic),
        );
        for mime in mime_types(&ordered) {
            assert!(
                !BLOCKED_MIME_TYPES.contains(&mime.as_str()),
                "blocked codec {} survived selection",
                mime
            );
        }
    }

    #[test]
    fn test_exact_match_is_first_regardless_of_position() {
        let preference = CodecPreference::for_platform(PlatformHint::Generic);
        // exact match buried in the middle of the default list
        let ordered = order_codecs(receiver_codec_capabilities(), &preference);
        assert_eq!(ordered[0].capability.mime_type, MIME_TYPE_H264);
        assert_eq!(ordered[0].capability.sdp_fmtp_line, H264_FMTP_LINE);

        // and when it is the last entry
        let mut reversed = receiver_codec_capabilities();
        reversed.reverse();
        let ordered = order_codecs(reversed, &preference);
        assert_eq!(ordered[0].capability.sdp_fmtp_line, H264_FMTP_LINE);
    }

    #[test]
    fn test_prefix_matches_precede_non_matches() {
        let preference = CodecPreference::for_platform(PlatformHint::Generic);
        let codecs = vec![
            video_codec(MIME_TYPE_VP8, ""),
            video_codec(
                MIME_TYPE_H264,
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f",
            ),
            video_codec(MIME_TYPE_VP9, "profile-id=0"),
        ];
        let ordered = order_codecs(codecs, &preference);
        // no exact match present: the prefix match still leads
        assert_eq!(ordered[0].capability.mime_type, MIME_TYPE_H264);
        assert_eq!(
            mime_types(&ordered[1..]),
            vec![MIME_TYPE_VP8.to_string(), MIME_TYPE_VP9.to_string()],
            "non-matching relative order must be preserved"
        );
    }

    #[test]
    fn test_packetization_mode_zero_is_not_a_prefix_match() {
        let preference = CodecPreference::for_platform(PlatformHint::Generic);
        let codecs = vec![
            video_codec(MIME_TYPE_VP8, ""),
            video_codec(
                MIME_TYPE_H264,
                "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42e01f",
            ),
        ];
        let ordered = order_codecs(codecs, &preference);
        assert_eq!(ordered[0].capability.mime_type, MIME_TYPE_VP8);
    }

    #[test]
    fn test_mac_hint_prefers_vp9() {
        let preference = CodecPreference::for_platform(PlatformHint::Mac);
        let ordered = order_codecs(receiver_codec_capabilities(), &preference);
        assert_eq!(ordered[0].capability.mime_type, MIME_TYPE_VP9);
        assert_eq!(ordered[0].capability.sdp_fmtp_line, VP9_FMTP_LINE);
    }
}
