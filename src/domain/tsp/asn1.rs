//! DER wire structures for RFC 3161.
//!
//! The ASN.1 module is defined with `IMPLICIT TAGS`, so context-specific
//! fields are implicit unless the underlying type is a CHOICE.

use der::asn1::{Any, BitString, GeneralizedTime, ObjectIdentifier, OctetString, Uint};
use der::Sequence;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::Extension;

/// ```text
/// MessageImprint ::= SEQUENCE {
///     hashAlgorithm  AlgorithmIdentifier,
///     hashedMessage  OCTET STRING }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct MessageImprintAsn1 {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub hashed_message: OctetString,
}

/// ```text
/// TimeStampReq ::= SEQUENCE {
///     version         INTEGER { v1(1) },
///     messageImprint  MessageImprint,
///     reqPolicy       TSAPolicyId OPTIONAL,
///     nonce           INTEGER OPTIONAL,
///     certReq         BOOLEAN DEFAULT FALSE,
///     extensions      [0] IMPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct TimeStampReqAsn1 {
    pub version: u8,
    pub message_imprint: MessageImprintAsn1,
    pub req_policy: Option<ObjectIdentifier>,
    pub nonce: Option<Uint>,
    #[asn1(default = "Default::default")]
    pub cert_req: bool,
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub extensions: Option<Vec<Extension>>,
}

/// ```text
/// PKIStatusInfo ::= SEQUENCE {
///     status        PKIStatus,
///     statusString  PKIFreeText OPTIONAL,
///     failInfo      PKIFailureInfo OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PkiStatusInfoAsn1 {
    pub status: u8,
    pub status_string: Option<Vec<String>>,
    pub fail_info: Option<BitString>,
}

/// ```text
/// TimeStampResp ::= SEQUENCE {
///     status          PKIStatusInfo,
///     timeStampToken  TimeStampToken OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct TimeStampRespAsn1 {
    pub status: PkiStatusInfoAsn1,
    pub time_stamp_token: Option<Any>,
}

/// ```text
/// Accuracy ::= SEQUENCE {
///     seconds  INTEGER OPTIONAL,
///     millis   [0] INTEGER (1..999) OPTIONAL,
///     micros   [1] INTEGER (1..999) OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct AccuracyAsn1 {
    pub seconds: Option<u32>,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub millis: Option<u16>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub micros: Option<u16>,
}

/// ```text
/// TSTInfo ::= SEQUENCE {
///     version         INTEGER { v1(1) },
///     policy          TSAPolicyId,
///     messageImprint  MessageImprint,
///     serialNumber    INTEGER,
///     genTime         GeneralizedTime,
///     accuracy        Accuracy OPTIONAL,
///     ordering        BOOLEAN DEFAULT FALSE,
///     nonce           INTEGER OPTIONAL,
///     tsa             [0] GeneralName OPTIONAL,
///     extensions      [1] IMPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct TstInfoAsn1 {
    pub version: u8,
    pub policy: ObjectIdentifier,
    pub message_imprint: MessageImprintAsn1,
    pub serial_number: Uint,
    pub gen_time: GeneralizedTime,
    pub accuracy: Option<AccuracyAsn1>,
    #[asn1(default = "Default::default")]
    pub ordering: bool,
    pub nonce: Option<Uint>,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub tsa: Option<GeneralName>,
    #[asn1(
        context_specific = "1",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub extensions: Option<Vec<Extension>>,
}

/// CMS `ContentInfo` wrapping a timestamp token (RFC 5652 §3).
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct ContentInfoAsn1 {
    pub content_type: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT")]
    pub content: Any,
}

/// Read side of CMS `SignedData`; signer infos are kept opaque.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct SignedDataAsn1 {
    pub version: u8,
    pub digest_algorithms: Any,
    pub encap_content_info: EncapsulatedContentInfoAsn1,
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub certificates: Option<Vec<x509_cert::Certificate>>,
    #[asn1(
        context_specific = "1",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub crls: Option<Vec<Any>>,
    pub signer_infos: Any,
}

#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct EncapsulatedContentInfoAsn1 {
    pub e_content_type: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub e_content: Option<OctetString>,
}

/// Encode a `PKIFailureInfo` named bit as a DER BIT STRING with trailing
/// zero bits trimmed.
pub fn failure_info_bits(bit: u8) -> der::Result<BitString> {
    let byte_index = usize::from(bit / 8);
    let mut bytes = vec![0u8; byte_index + 1];
    bytes[byte_index] = 0x80 >> (bit % 8);
    BitString::new(7 - (bit % 8), bytes)
}

/// Lowest set named bit, if any.
#[must_use]
pub fn first_failure_bit(bits: &BitString) -> Option<u8> {
    bits.bits()
        .enumerate()
        .find(|(_, set)| *set)
        .and_then(|(i, _)| u8::try_from(i).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Encode;

    #[test]
    fn test_failure_info_encoding() {
        // badRequest (bit 2): 03 02 05 20
        let bits = failure_info_bits(2).unwrap();
        assert_eq!(bits.to_der().unwrap(), vec![0x03, 0x02, 0x05, 0x20]);
        assert_eq!(first_failure_bit(&bits), Some(2));

        // systemFailure (bit 25): four bytes, 6 unused bits
        let bits = failure_info_bits(25).unwrap();
        assert_eq!(
            bits.to_der().unwrap(),
            vec![0x03, 0x05, 0x06, 0x00, 0x00, 0x00, 0x40]
        );
        assert_eq!(first_failure_bit(&bits), Some(25));
    }
}
