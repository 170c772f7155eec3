//! RFC 3161 DER codec.
//!
//! Converts between the engine's timestamp types and their DER encodings.
//! Parsing is strict: empty input, trailing bytes and unknown hash OIDs are
//! reported as distinct error kinds so a front end can map them to HTTP
//! responses.

use crate::domain::asn1_util::decode_strict;
use crate::domain::constants::{OID_CT_TST_INFO, OID_SIGNED_DATA};
use crate::domain::crypto::{chrono_to_generalized, generalized_to_chrono, HashAlgorithm};
use crate::domain::serial::SerialNumber;
use crate::domain::tsp::asn1::{
    failure_info_bits, first_failure_bit, AccuracyAsn1, ContentInfoAsn1, MessageImprintAsn1,
    PkiStatusInfoAsn1, SignedDataAsn1, TimeStampReqAsn1, TimeStampRespAsn1, TstInfoAsn1,
};
use crate::domain::tsp::{
    Accuracy, MessageImprint, PkiFailureInfo, PkiStatus, PkiStatusInfo, TimestampRequest,
    TimestampResponse, TimestampToken, TstInfo,
};
use crate::infra::error::{CaError, CaResult};
use der::asn1::{Any, OctetString, Uint};
use der::{Decode, Encode, Tag};
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;

const TIMESTAMP_REQUEST: &str = "timestamp request";
const TIMESTAMP_RESPONSE: &str = "timestamp response";

/// Decode a DER `TimeStampReq`.
pub fn parse_timestamp_request(der: &[u8]) -> CaResult<TimestampRequest> {
    let asn1: TimeStampReqAsn1 = decode_strict(der, TIMESTAMP_REQUEST)?;
    Ok(TimestampRequest {
        version: asn1.version,
        message_imprint: imprint_from_asn1(&asn1.message_imprint)?,
        req_policy: asn1.req_policy,
        nonce: asn1.nonce.as_ref().map(|n| n.as_bytes().to_vec()),
        cert_req: asn1.cert_req,
        extensions: asn1.extensions.unwrap_or_default(),
    })
}

pub fn serialize_timestamp_request(request: &TimestampRequest) -> CaResult<Vec<u8>> {
    let asn1 = TimeStampReqAsn1 {
        version: request.version,
        message_imprint: imprint_to_asn1(&request.message_imprint)?,
        req_policy: request.req_policy,
        nonce: request.nonce.as_deref().map(uint_from_magnitude).transpose()?,
        cert_req: request.cert_req,
        extensions: non_empty(request.extensions.clone()),
    };
    Ok(asn1.to_der()?)
}

/// Encode a `TimeStampResp`. A missing response is an error, not an empty
/// encoding.
pub fn serialize_timestamp_response(response: Option<&TimestampResponse>) -> CaResult<Vec<u8>> {
    let response = response.ok_or(CaError::NilResponse)?;
    let time_stamp_token = response
        .token
        .as_ref()
        .map(|token| Any::from_der(&token.signed_data))
        .transpose()
        .map_err(|e| CaError::Asn1Error(format!("Invalid timestamp token encoding: {e}")))?;

    let asn1 = TimeStampRespAsn1 {
        status: status_to_asn1(&response.status)?,
        time_stamp_token,
    };
    Ok(asn1.to_der()?)
}

/// Decode a `TimeStampResp`, extracting the TSTInfo from a granted token.
pub fn parse_timestamp_response(der: &[u8]) -> CaResult<TimestampResponse> {
    let asn1: TimeStampRespAsn1 = decode_strict(der, TIMESTAMP_RESPONSE)?;
    let status = status_from_asn1(&asn1.status)?;
    let token = match asn1.time_stamp_token {
        Some(any) => {
            let signed_data = any.to_der()?;
            let tst_info = decode_tst_info(&extract_tst_info(&signed_data)?)?;
            Some(TimestampToken {
                tst_info,
                signed_data,
            })
        }
        None => None,
    };
    Ok(TimestampResponse { status, token })
}

/// DER `TSTInfo`, the content signed into a token.
pub fn encode_tst_info(info: &TstInfo) -> CaResult<Vec<u8>> {
    let asn1 = TstInfoAsn1 {
        version: info.version,
        policy: info.policy,
        message_imprint: imprint_to_asn1(&info.message_imprint)?,
        serial_number: info.serial_number.to_uint()?,
        gen_time: chrono_to_generalized(info.gen_time)?,
        accuracy: info.accuracy.map(|a| AccuracyAsn1 {
            seconds: a.seconds,
            millis: a.millis,
            micros: a.micros,
        }),
        ordering: info.ordering,
        nonce: info.nonce.as_deref().map(uint_from_magnitude).transpose()?,
        tsa: info.tsa.clone().map(GeneralName::DirectoryName),
        extensions: non_empty(info.extensions.clone()),
    };
    Ok(asn1.to_der()?)
}

pub fn decode_tst_info(der: &[u8]) -> CaResult<TstInfo> {
    let asn1: TstInfoAsn1 = decode_strict(der, "TSTInfo")?;
    let tsa = match asn1.tsa {
        Some(GeneralName::DirectoryName(name)) => Some(name),
        Some(_) => {
            return Err(CaError::MalformedRequest(
                "TSA name is not a directory name".into(),
            ))
        }
        None => None,
    };
    Ok(TstInfo {
        version: asn1.version,
        policy: asn1.policy,
        message_imprint: imprint_from_asn1(&asn1.message_imprint)?,
        serial_number: SerialNumber::from_uint(&asn1.serial_number),
        gen_time: generalized_to_chrono(&asn1.gen_time)?,
        accuracy: asn1.accuracy.map(|a| Accuracy {
            seconds: a.seconds,
            millis: a.millis,
            micros: a.micros,
        }),
        ordering: asn1.ordering,
        nonce: asn1.nonce.as_ref().map(|n| n.as_bytes().to_vec()),
        tsa,
        extensions: asn1.extensions.unwrap_or_default(),
    })
}

/// Pull the encapsulated TSTInfo out of a CMS `ContentInfo`.
pub fn extract_tst_info(content_info_der: &[u8]) -> CaResult<Vec<u8>> {
    let content_info: ContentInfoAsn1 = decode_strict(content_info_der, "timestamp token")?;
    if content_info.content_type != OID_SIGNED_DATA {
        return Err(CaError::MalformedRequest(format!(
            "Timestamp token content type is {}, expected signedData",
            content_info.content_type
        )));
    }
    let signed_data = SignedDataAsn1::from_der(&content_info.content.to_der()?).map_err(|e| {
        CaError::MalformedRequest(format!("Failed to decode token SignedData: {e}"))
    })?;
    let encap = signed_data.encap_content_info;
    if encap.e_content_type != OID_CT_TST_INFO {
        return Err(CaError::MalformedRequest(format!(
            "Encapsulated content type is {}, expected id-ct-TSTInfo",
            encap.e_content_type
        )));
    }
    encap
        .e_content
        .map(|content| content.as_bytes().to_vec())
        .ok_or_else(|| CaError::MalformedRequest("Timestamp token has no TSTInfo".into()))
}

fn imprint_from_asn1(asn1: &MessageImprintAsn1) -> CaResult<MessageImprint> {
    Ok(MessageImprint {
        hash_algorithm: HashAlgorithm::from_oid(&asn1.hash_algorithm.oid)?,
        hashed_message: asn1.hashed_message.as_bytes().to_vec(),
    })
}

fn imprint_to_asn1(imprint: &MessageImprint) -> CaResult<MessageImprintAsn1> {
    Ok(MessageImprintAsn1 {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: imprint.hash_algorithm.oid(),
            parameters: Some(Any::new(Tag::Null, Vec::<u8>::new())?),
        },
        hashed_message: OctetString::new(imprint.hashed_message.clone())?,
    })
}

fn status_to_asn1(status: &PkiStatusInfo) -> CaResult<PkiStatusInfoAsn1> {
    Ok(PkiStatusInfoAsn1 {
        status: status.status as u8,
        status_string: status.status_string.clone().map(|s| vec![s]),
        fail_info: status
            .fail_info
            .map(|f| failure_info_bits(f.bit()))
            .transpose()?,
    })
}

fn status_from_asn1(asn1: &PkiStatusInfoAsn1) -> CaResult<PkiStatusInfo> {
    let status = PkiStatus::from_code(asn1.status).ok_or_else(|| {
        CaError::MalformedRequest(format!("Unknown PKIStatus value {}", asn1.status))
    })?;
    let status_string = asn1
        .status_string
        .as_ref()
        .filter(|strings| !strings.is_empty())
        .map(|strings| strings.join("; "));
    let fail_info = asn1
        .fail_info
        .as_ref()
        .and_then(first_failure_bit)
        .and_then(PkiFailureInfo::from_bit);
    Ok(PkiStatusInfo {
        status,
        status_string,
        fail_info,
    })
}

fn uint_from_magnitude(bytes: &[u8]) -> CaResult<Uint> {
    let bytes: &[u8] = if bytes.is_empty() { &[0] } else { bytes };
    Ok(Uint::new(bytes)?)
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use der::asn1::ObjectIdentifier;

    fn sample_request() -> TimestampRequest {
        let mut request = TimestampRequest::for_data(HashAlgorithm::Sha256, b"document");
        request.nonce = Some(vec![0x8f, 0x01, 0x02]);
        request.cert_req = true;
        request.req_policy = Some(ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1"));
        request
    }

    #[test]
    fn test_request_fields_survive_encoding() {
        let request = sample_request();
        let der = serialize_timestamp_request(&request).unwrap();
        let parsed = parse_timestamp_request(&der).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_request_parse_errors() {
        assert!(matches!(
            parse_timestamp_request(&[]),
            Err(CaError::EmptyRequest(_))
        ));

        let mut der = serialize_timestamp_request(&sample_request()).unwrap();
        der.push(0x00);
        assert!(matches!(
            parse_timestamp_request(&der),
            Err(CaError::TrailingData(_))
        ));

        assert!(matches!(
            parse_timestamp_request(&[0x30, 0x03, 0x02, 0x01]),
            Err(CaError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_unknown_hash_oid_is_reported() {
        let mut asn1 = TimeStampReqAsn1::from_der(
            &serialize_timestamp_request(&sample_request()).unwrap(),
        )
        .unwrap();
        asn1.message_imprint.hash_algorithm.oid = ObjectIdentifier::new_unwrap("1.2.840.113549.2.5");
        let der = asn1.to_der().unwrap();
        assert!(matches!(
            parse_timestamp_request(&der),
            Err(CaError::UnsupportedHashAlgorithm(_))
        ));
    }

    #[test]
    fn test_nil_response_is_an_error() {
        assert!(matches!(
            serialize_timestamp_response(None),
            Err(CaError::NilResponse)
        ));
    }

    #[test]
    fn test_rejection_encoding() {
        let rejected = TimestampResponse::rejected(PkiFailureInfo::BadRequest, "message imprint is empty");
        let der = serialize_timestamp_response(Some(&rejected)).unwrap();
        let parsed = parse_timestamp_response(&der).unwrap();
        assert_eq!(parsed, rejected);

        // status 2, statusString, failInfo badRequest
        let asn1 = TimeStampRespAsn1::from_der(&der).unwrap();
        assert_eq!(asn1.status.status, 2);
        assert_eq!(
            asn1.status.fail_info.unwrap().to_der().unwrap(),
            vec![0x03, 0x02, 0x05, 0x20]
        );
        assert!(asn1.time_stamp_token.is_none());
    }

    #[test]
    fn test_tst_info_encoding() {
        let info = TstInfo {
            version: 1,
            policy: ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.2"),
            message_imprint: MessageImprint {
                hash_algorithm: HashAlgorithm::Sha384,
                hashed_message: HashAlgorithm::Sha384.digest(b"x"),
            },
            serial_number: SerialNumber::from_u128((7u128 << 64) | 0xdead_beef),
            gen_time: Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap(),
            accuracy: Some(Accuracy {
                seconds: Some(1),
                millis: Some(500),
                micros: None,
            }),
            ordering: true,
            nonce: Some(vec![0x01]),
            tsa: None,
            extensions: Vec::new(),
        };
        let der = encode_tst_info(&info).unwrap();
        assert_eq!(decode_tst_info(&der).unwrap(), info);
    }
}
