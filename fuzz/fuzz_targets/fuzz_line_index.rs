#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use linex::index::LineIndexBuilder;

#[derive(Arbitrary, Debug)]
struct Input {
    max_partial: u16,
    lookback: u8,
    /// Block boundaries, as lengths
    splits: Vec<u16>,
    data: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let max_partial = (input.max_partial as usize).max(1);
    let mut builder = LineIndexBuilder::new(max_partial, input.lookback as usize);

    let mut rest = &input.data[..];
    for len in input.splits {
        let (block, tail) = rest.split_at((len as usize).min(rest.len()));
        builder.push(block).unwrap();
        rest = tail;
    }
    builder.push(rest).unwrap();
    let (index, _) = builder.finish();

    // Partials tile the content; only a terminator may sit past the limit
    let mut expected_start = 0;
    for i in 0..index.partial_count() {
        let range = index.partial_range(i);
        assert_eq!(range.start, expected_start);
        assert!(range.end > range.start);
        let len = range.end - range.start;
        let bytes = &input.data[range.start as usize..range.end as usize];
        let terminator = if bytes.ends_with(b"\r\n") {
            2
        } else {
            usize::from(bytes.ends_with(b"\n")) as u64
        };
        assert!(len - terminator <= max_partial as u64);
        expected_start = range.end;
    }
    assert_eq!(expected_start, input.data.len() as u64);
});
