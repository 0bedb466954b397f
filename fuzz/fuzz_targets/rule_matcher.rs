#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use logship_core::types::{Predicate, PredicateField, PredicateKind};
use logship_pipeline::rule::Matcher;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    regex: bool,
    expression: String,
    value: String,
}

fuzz_target!(|input: FuzzInput| {
    let predicate = Predicate {
        kind: if input.regex {
            PredicateKind::Regex
        } else {
            PredicateKind::Substring
        },
        field: PredicateField::Message,
        expression: input.expression,
    };

    // 잘못된 정규식은 에러로 거부되어야 하며 패닉이 없어야 한다
    if let Ok(matcher) = Matcher::compile("fuzz", &predicate) {
        let hit = matcher.is_match(&input.value);
        // 부분 문자열 매칭은 대소문자를 구분하지 않음
        if !input.regex && input.value.is_ascii() && predicate.expression.is_ascii() {
            let expected = input
                .value
                .to_ascii_lowercase()
                .contains(&predicate.expression.to_ascii_lowercase());
            assert_eq!(hit, expected);
        }
    }
});
