//! Property tests over a small GPT-2 style vocabulary.

use proptest::prelude::*;
use rankbpe::{StreamingDecoder, Tokenizer};

const EOT: &str = "<|endoftext|>";

/// Every single byte plus a handful of trained-looking merges.
fn create_tokenizer() -> Tokenizer {
    let mut vocab: Vec<(u32, Vec<u8>)> = (0u8..=255).map(|b| (b as u32, vec![b])).collect();
    let rules: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"t".to_vec(), b"h".to_vec()),
        (b"th".to_vec(), b"e".to_vec()),
        (b" ".to_vec(), b"the".to_vec()),
        (b"i".to_vec(), b"n".to_vec()),
        (b"in".to_vec(), b"g".to_vec()),
        (b"e".to_vec(), b"r".to_vec()),
        (b" ".to_vec(), b"a".to_vec()),
        (b"a".to_vec(), b"n".to_vec()),
        (vec![0xC3], vec![0xA9]),
        (vec![0xE4], vec![0xB8]),
        (vec![0xE4, 0xB8], vec![0x96]),
    ];
    for (left, right) in &rules {
        vocab.push((vocab.len() as u32, [left.as_slice(), right.as_slice()].concat()));
    }
    Tokenizer::new(vocab, rules, &[EOT]).unwrap()
}

#[test]
fn test_known_merges() {
    let tokenizer = create_tokenizer();
    let the = tokenizer.token_id(b"the").unwrap();
    let space_the = tokenizer.token_id(b" the").unwrap();
    let th = tokenizer.token_id(b"th").unwrap();
    let ing = tokenizer.token_id(b"ing").unwrap();
    let shi = tokenizer.token_id("世".as_bytes()).unwrap();

    assert_eq!(tokenizer.encode("the"), vec![the]);
    assert_eq!(tokenizer.encode(" the"), vec![space_the]);
    assert_eq!(tokenizer.encode("thing"), vec![th, ing]);
    assert_eq!(tokenizer.encode("世"), vec![shi]);
}

#[test]
fn test_shared_across_threads() {
    let tokenizer = &create_tokenizer();
    let text = "the thing in the corner ";
    let expected = tokenizer.encode(text);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(move || tokenizer.encode(text)))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

fn plain_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,!?'\n\t]{0,40}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Round-trip holds for any string when every byte has a token.
    #[test]
    fn prop_roundtrip(text in any::<String>()) {
        let tokenizer = create_tokenizer();
        let tokens = tokenizer.encode(&text);
        prop_assert_eq!(tokenizer.decode(&tokens).unwrap(), text);
    }

    /// Merges only combine, so there are never more ids than bytes.
    #[test]
    fn prop_length_non_increase(text in any::<String>()) {
        let tokenizer = create_tokenizer();
        prop_assert!(tokenizer.encode(&text).len() <= text.len());
    }

    /// Repeated calls and separately built tokenizers agree.
    #[test]
    fn prop_deterministic(text in any::<String>()) {
        let first = create_tokenizer();
        let second = create_tokenizer();
        let tokens = first.encode(&text);
        prop_assert_eq!(&tokens, &first.encode(&text));
        prop_assert_eq!(&tokens, &second.encode(&text));
        prop_assert_eq!(&tokens, &first.encode_rayon(&text));
    }

    /// The special id sits exactly where the literal was, once.
    #[test]
    fn prop_special_atomicity(left in plain_text(), right in plain_text()) {
        let tokenizer = create_tokenizer();
        let eot = tokenizer.special_token_id(EOT).unwrap();

        let tokens = tokenizer.encode(&format!("{left}{EOT}{right}"));
        let mut expected = tokenizer.encode(&left);
        expected.push(eot);
        expected.extend(tokenizer.encode(&right));

        prop_assert_eq!(tokens.iter().filter(|&&t| t == eot).count(), 1);
        prop_assert_eq!(tokens, expected);
        prop_assert!(!tokenizer.encode(&left).contains(&eot));
    }

    /// Streaming encode is the concatenation of per-text encodes.
    #[test]
    fn prop_stream_matches_encode(texts in prop::collection::vec(any::<String>(), 0..8)) {
        let tokenizer = create_tokenizer();
        let streamed: Vec<u32> = tokenizer.encode_stream(&texts).collect();
        let eager: Vec<u32> = texts.iter().flat_map(|t| tokenizer.encode(t)).collect();
        prop_assert_eq!(streamed, eager);
    }

    /// Token-by-token decoding reassembles the original text.
    #[test]
    fn prop_streaming_decoder(text in any::<String>()) {
        let tokenizer = create_tokenizer();
        let mut decoder = StreamingDecoder::new(&tokenizer);
        let mut out = String::new();
        for id in tokenizer.encode(&text) {
            if let Some(piece) = decoder.add_token(id).unwrap() {
                out.push_str(&piece);
            }
        }
        out.push_str(&decoder.flush());
        prop_assert_eq!(out, text);
    }
}
