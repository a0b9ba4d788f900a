use netassert_rs::error::SpecError;
use netassert_rs::nmap::build_options;
use netassert_rs::ports::{normalize, strip_negation, strip_protocol, Protocol, RawSpec};

#[test]
fn normalize_matches_delimiter_split() {
    let input = "22, 80\t-443,,UDP:53\n HTTP:8080";
    let tokens = normalize(&RawSpec::from(input)).expect("parse ok");
    assert_eq!(tokens, vec!["22", "80", "-443", "UDP:53", "HTTP:8080"]);
}

#[test]
fn empty_token_rejected_with_full_list() {
    let err = normalize(&RawSpec::from(vec!["80", "443,"])).unwrap_err();
    assert_eq!(
        err,
        SpecError::InvalidSpecification {
            tokens: vec!["80".into(), "443".into(), "".into()]
        }
    );
}

#[test]
fn codec_examples() {
    assert_eq!(strip_protocol("UDP:22"), "22");
    assert_eq!(strip_protocol("-TCP:80"), "-80");
    assert_eq!(strip_protocol("-80"), "-80");
    assert_eq!(strip_negation("TCP:-80"), "TCP:-80");
}

#[test]
fn option_strings_are_bit_exact() {
    let suffix = "-Pn -p T:80 --initial-rtt-timeout 10s --max-retries 100 --max-rate 1 --scan-delay 3.000 --host-timeout 30s";
    assert_eq!(build_options(&[80], "TCP".parse::<Protocol>().unwrap(), || 1.0), suffix);
    assert_eq!(
        build_options(&[80], "UDP".parse::<Protocol>().unwrap(), || 1.0),
        format!("-sU -sV {}", suffix.replace("T:80", "U:80"))
    );
}
