use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relext_core::{BatchIter, Vectorizer, Vocabulary, read_corpus};

fn corpus() -> String {
    let sentences = [
        "the system as described above has its greatest application in an arrayed configuration of antenna elements",
        "the child was carefully wrapped and bound into the cradle by means of a cord",
        "the author of a keygen uses a disassembler to look at the raw assembly code",
        "a misty ridge uprises from the surge",
        "the student association is the voice of the undergraduate student population",
    ];
    (0..200)
        .map(|i| {
            let s = sentences[i % sentences.len()];
            format!("{} 1 1 4 4 {s}\n", i % 19)
        })
        .collect()
}

fn bench_pipeline(c: &mut Criterion) {
    let text = corpus();
    let raw = read_corpus(text.as_bytes(), "bench").unwrap();
    let vocab = Vocabulary::build(&raw.sentences);
    let vectorizer = Vectorizer::new(&vocab, raw.max_sentence_len(), 60);
    let data = vectorizer.vectorize(&raw, "bench").unwrap();

    c.bench_function("vocab_build_200", |b| {
        b.iter(|| Vocabulary::build(black_box(&raw.sentences)));
    });

    c.bench_function("vectorize_200", |b| {
        b.iter(|| vectorizer.vectorize(black_box(&raw), "bench").unwrap());
    });

    c.bench_function("batch_inputs_200_by_50", |b| {
        b.iter(|| {
            for batch in BatchIter::sequential(black_box(&data), 50) {
                black_box(batch.inputs());
            }
        });
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
