use openssl::cms::{CMSOptions, CmsContentInfo};
use openssl::stack::Stack;
use pki_ca_engine::domain::tsp::{PkiFailureInfo, PkiStatus, TimestampRequest};
use pki_ca_engine::infra::config::KeySection;
use pki_ca_engine::services::{
    parse_timestamp_request, parse_timestamp_response, serialize_timestamp_request,
    serialize_timestamp_response, SoftwareProvider,
};
use pki_ca_engine::{CaError, CaHierarchy, EngineConfiguration, HashAlgorithm};
use std::sync::Arc;

fn hierarchy(configure: impl FnOnce(&mut EngineConfiguration)) -> CaHierarchy {
    let mut config = EngineConfiguration::default();
    config.root.key = KeySection {
        algorithm: "ECDSA".into(),
        parameter: Some("P-256".into()),
    };
    configure(&mut config);
    CaHierarchy::build(&config, Arc::new(SoftwareProvider::new())).expect("hierarchy")
}

#[test]
fn short_sha256_imprint_is_rejected() {
    let hierarchy = hierarchy(|_| {});
    let request = TimestampRequest::new(HashAlgorithm::Sha256, vec![0xab; 16]);

    let response = hierarchy.tsa().create_timestamp(Some(&request));
    assert_eq!(response.status.status, PkiStatus::Rejection);
    assert_eq!(response.status.fail_info, Some(PkiFailureInfo::BadRequest));
    assert!(response
        .status
        .status_string
        .as_deref()
        .unwrap_or_default()
        .contains("hash length mismatch"));
    assert!(response.token.is_none());

    // Rejections still encode as a valid TimeStampResp
    let der = serialize_timestamp_response(Some(&response)).unwrap();
    let decoded = parse_timestamp_response(&der).unwrap();
    assert_eq!(decoded.status, response.status);
}

#[test]
fn der_query_is_granted_and_signed_by_tsa_certificate() {
    let hierarchy = hierarchy(|config| config.tsa.include_tsa_name = true);
    let mut request = TimestampRequest::for_data(HashAlgorithm::Sha384, b"release artifact");
    request.nonce = Some(vec![0x01, 0x02, 0x03, 0x04]);
    request.cert_req = true;

    let query = serialize_timestamp_request(&request).unwrap();
    let parsed = parse_timestamp_request(&query).unwrap();
    assert_eq!(parsed, request);

    let response = hierarchy.tsa().create_timestamp(Some(&parsed));
    assert!(response.is_granted());

    let der = serialize_timestamp_response(Some(&response)).unwrap();
    let decoded = parse_timestamp_response(&der).unwrap();
    let token = decoded.token.expect("token");
    assert_eq!(token.tst_info.message_imprint, request.message_imprint);
    assert_eq!(token.tst_info.nonce, request.nonce);
    assert_eq!(token.tst_info.policy, hierarchy.tsa().policy());
    assert!(token.tst_info.tsa.is_some());

    let mut cms = CmsContentInfo::from_der(&token.signed_data).unwrap();
    let mut certs = Stack::new().unwrap();
    certs
        .push(hierarchy.tsa_certificate().certificate.clone())
        .unwrap();
    cms.verify(
        Some(&*certs),
        None,
        None,
        None,
        CMSOptions::NO_SIGNER_CERT_VERIFY,
    )
    .unwrap();
}

#[test]
fn unaccepted_policy_and_algorithm_are_rejected() {
    let hierarchy = hierarchy(|config| {
        config.tsa.accepted_policies = vec!["1.3.6.1.4.1.99999.1.1".into()];
        config.tsa.accepted_algorithms = vec!["sha512".into()];
    });

    let request = TimestampRequest::for_data(HashAlgorithm::Sha256, b"data");
    let response = hierarchy.tsa().create_timestamp(Some(&request));
    assert_eq!(response.status.fail_info, Some(PkiFailureInfo::BadRequest));

    let mut request = TimestampRequest::for_data(HashAlgorithm::Sha512, b"data");
    request.req_policy = Some("1.3.6.1.4.1.99999.2".parse().unwrap());
    let response = hierarchy.tsa().create_timestamp(Some(&request));
    assert!(response
        .status
        .status_string
        .as_deref()
        .unwrap_or_default()
        .contains("unaccepted policy"));

    request.req_policy = Some("1.3.6.1.4.1.99999.1.1".parse().unwrap());
    assert!(hierarchy.tsa().create_timestamp(Some(&request)).is_granted());
}

#[test]
fn codec_rejects_empty_trailing_and_missing_inputs() {
    assert!(matches!(
        parse_timestamp_request(&[]),
        Err(CaError::EmptyRequest(_))
    ));

    let request = TimestampRequest::for_data(HashAlgorithm::Sha256, b"x");
    let mut query = serialize_timestamp_request(&request).unwrap();
    query.push(0x00);
    assert!(matches!(
        parse_timestamp_request(&query),
        Err(CaError::TrailingData(_))
    ));

    assert!(matches!(
        serialize_timestamp_response(None),
        Err(CaError::NilResponse)
    ));
}
