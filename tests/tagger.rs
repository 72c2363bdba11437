use std::collections::BTreeMap;

use arg_bilstm::{
    datasets::{DatasetDescriptor, DatasetSplits},
    embeddings::EmbeddingMatrix,
    mappings::{Mapping, Mappings, CASING, PADDING, TOKENS},
    models::bilstm::{AttentionConfig, AttentionVariant, CharEncoding, FeatureScope, ScoreFunction},
    pipelines::token_classification::LifecycleState,
    utils::tensors,
    SentenceRecord, Tagger, TaggerConfig, TaggerError,
};
use burn::backend::{Autodiff, NdArray};
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, SeedableRng};

type TestBackend = Autodiff<NdArray>;

fn sentence(raw: &[&str], tokens: Vec<usize>, casing: Vec<usize>, labels: Vec<usize>) -> SentenceRecord {
    SentenceRecord {
        raw_tokens: raw.iter().map(|token| token.to_string()).collect(),
        tokens,
        casing,
        ..Default::default()
    }
    .with_labels("labels", labels)
}

fn mappings() -> Mappings {
    Mappings::new()
        .with(
            TOKENS,
            Mapping::from([
                ("hello", 1),
                ("world", 2),
                ("it", 3),
                ("nice", 4),
                ("is", 5),
                ("a", 6),
                ("day", 7),
            ]),
        )
        .with("labels", Mapping::from([("0", 0), ("1", 1), ("2", 2)]))
        .with(
            CASING,
            Mapping::from([
                (PADDING, 0),
                ("other", 1),
                ("numeric", 2),
                ("mainly_numeric", 3),
                ("allLower", 4),
                ("allUpper", 5),
                ("initialUpper", 6),
                ("contains_digit", 7),
            ]),
        )
}

fn embeddings() -> EmbeddingMatrix {
    EmbeddingMatrix::random(12, 5, &mut StdRng::seed_from_u64(3)).unwrap()
}

fn train_sentences() -> Vec<SentenceRecord> {
    vec![
        sentence(&["hello", "world"], vec![1, 2], vec![5, 4], vec![0, 0]),
        sentence(
            &["it", "is", "a", "nice", "day"],
            vec![3, 5, 6, 4, 7],
            vec![4, 4, 4, 4, 4],
            vec![0, 0, 1, 1, 1],
        ),
        // A padding token inside a real sentence
        sentence(&["PADDING", "world"], vec![0, 2], vec![0, 4], vec![0, 0]),
    ]
}

fn held_out() -> Vec<SentenceRecord> {
    vec![sentence(
        &["nice", "day", "it", "is"],
        vec![4, 7, 3, 5],
        vec![4, 4, 4, 4],
        vec![1, 1, 0, 0],
    )]
}

fn datasets() -> BTreeMap<String, DatasetDescriptor> {
    BTreeMap::from([("name".to_string(), DatasetDescriptor::new("labels", true))])
}

fn data() -> BTreeMap<String, DatasetSplits> {
    BTreeMap::from([(
        "name".to_string(),
        DatasetSplits {
            train: train_sentences(),
            dev: held_out(),
            test: held_out(),
        },
    )])
}

fn config() -> TaggerConfig {
    TaggerConfig::new().with_lstm_size(8).with_batch_size(10)
}

fn tagger(config: TaggerConfig) -> Tagger<TestBackend> {
    let mut tagger = Tagger::new(config, Default::default()).unwrap();

    tagger.set_mappings(mappings(), embeddings()).unwrap();
    tagger.set_dataset(datasets(), data()).unwrap();

    tagger
}

fn built(config: TaggerConfig) -> Tagger<TestBackend> {
    let mut tagger = tagger(config);
    tagger.build_model().unwrap();

    tagger
}

fn non_padding(sentence: &SentenceRecord) -> usize {
    sentence.tokens.iter().filter(|&&token| token != 0).count()
}

fn attention_configs() -> Vec<AttentionConfig> {
    vec![
        AttentionConfig::time(),
        AttentionConfig::time().with_score(ScoreFunction::Additive),
        AttentionConfig::feature(),
        AttentionConfig::feature()
            .with_score(ScoreFunction::Additive)
            .with_scope(FeatureScope::Shared),
    ]
}

#[test]
fn builds_the_model() {
    let mut tagger = tagger(config());
    assert_eq!(tagger.state(), LifecycleState::Unbuilt);

    tagger.build_model().unwrap();

    assert_eq!(tagger.state(), LifecycleState::Built);
    assert_eq!(tagger.model_config().unwrap().heads.len(), 1);
    assert_eq!(tagger.model_config().unwrap().heads[0].n_classes, 3);
}

#[test]
fn fits_for_the_requested_epochs() {
    let mut tagger = built(config());

    let report = tagger.fit(2).unwrap();

    assert_eq!(tagger.state(), LifecycleState::Trained);
    assert_eq!(report.epochs.len(), 2);
    assert_eq!(report.epochs[1].epoch, 2);

    let train = &report.epochs[0].train["name"];
    // The padding token of the third sentence is left out of the loss
    assert_eq!(train.positions, 8);
    assert!(train.loss.is_finite());

    let dev = &report.epochs[1].dev["name"];
    assert_eq!(dev.positions, 4);
    assert!((0.0..=1.0).contains(&dev.accuracy));
    assert!(report.epochs[1].test.contains_key("name"));

    // Fitting again continues the epoch count
    let report = tagger.fit(1).unwrap();
    assert_eq!(report.epochs[0].epoch, 3);
    assert_eq!(tagger.epochs_trained(), 3);
}

#[test]
fn tags_every_token_of_every_sentence() {
    let mut tagger = built(config());
    tagger.fit(1).unwrap();

    let sentences = train_sentences();
    let labels = tagger.tag_sentences(&sentences).unwrap();

    assert_eq!(labels["name"].len(), sentences.len());
    for (predicted, sentence) in labels["name"].iter().zip(&sentences) {
        assert_eq!(predicted.len(), sentence.tokens.len());
        assert!(predicted.iter().all(|label| ["0", "1", "2"].contains(&label.as_str())));
    }
}

#[test]
fn keeps_input_order_across_length_buckets() {
    let mut tagger = built(config().with_batch_size(1));
    tagger.fit(1).unwrap();

    let mut sentences = train_sentences();
    sentences.extend(held_out());

    let together = tagger.tag_sentences(&sentences).unwrap();

    for (i, sentence) in sentences.iter().enumerate() {
        let alone = tagger.tag_sentences(std::slice::from_ref(sentence)).unwrap();
        assert_eq!(alone["name"][0], together["name"][i]);
    }
}

#[test]
fn zero_epochs_leave_predictions_unchanged() {
    let mut tagger = built(config());
    let sentences = train_sentences();

    let before = tagger.tag_sentences(&sentences).unwrap();
    let report = tagger.fit(0).unwrap();
    let after = tagger.tag_sentences(&sentences).unwrap();

    assert!(report.epochs.is_empty());
    assert_eq!(tagger.state(), LifecycleState::Built);
    assert_eq!(before, after);
}

#[test]
fn attention_does_not_change_labels() {
    for attention in attention_configs() {
        let feature = attention.variant == AttentionVariant::Feature;

        let mut tagger = built(config().with_attention(Some(attention)));
        tagger.fit(1).unwrap();

        let sentences = train_sentences();
        let labels = tagger.predict(&sentences, false).unwrap();
        let with_attention = tagger.predict(&sentences, true).unwrap();

        assert_eq!(labels.labels, with_attention.labels);
        assert_eq!(labels.attention, None);

        let attention = with_attention.attention.unwrap();
        for (weights, sentence) in attention["name"].iter().zip(&sentences) {
            let real = non_padding(sentence);
            assert_eq!(weights.len(), real);

            for row in weights {
                // Time rows range over the real tokens, feature rows over both LSTM directions
                let width = if feature { 16 } else { real };
                assert_eq!(row.len(), width);
                assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-3);
            }
        }
    }
}

#[test]
fn predictions_leave_out_padding_tokens() {
    let mut tagger = built(config().with_attention(Some(AttentionConfig::time())));
    tagger.fit(1).unwrap();

    let sentences = train_sentences();
    let predictions = tagger.predict(&sentences, true).unwrap();
    let attention = predictions.attention.unwrap();

    for (i, sentence) in sentences.iter().enumerate() {
        let real = non_padding(sentence);

        assert_eq!(predictions.labels["name"][i].len(), real);
        assert_eq!(attention["name"][i].len(), real);
        assert!(attention["name"][i].iter().all(|row| row.len() == real));
    }

    // The PADDING sentence keeps only its second token
    assert_eq!(predictions.labels["name"][2].len(), 1);

    // Tagging still covers every token
    let tagged = tagger.tag_sentences(&sentences).unwrap();
    assert_eq!(tagged["name"][2].len(), 2);
    assert_eq!(tagged["name"][2][1], predictions.labels["name"][2][0]);
}

#[test]
fn attention_requires_an_attention_layer() {
    let tagger = built(config());

    let result = tagger.predict(&train_sentences(), true);

    assert!(matches!(result, Err(TaggerError::Configuration(_))));
}

#[test]
fn lifecycle_order_is_enforced() {
    let mut tagger = tagger(config());

    assert!(matches!(tagger.fit(1), Err(TaggerError::State(_))));
    assert!(matches!(
        tagger.tag_sentences(&train_sentences()),
        Err(TaggerError::State(_))
    ));

    tagger.build_model().unwrap();
    assert!(matches!(tagger.build_model(), Err(TaggerError::Configuration(_))));
    assert!(matches!(
        tagger.set_mappings(mappings(), embeddings()),
        Err(TaggerError::State(_))
    ));

    tagger.reset();
    assert_eq!(tagger.state(), LifecycleState::Unbuilt);
    tagger.build_model().unwrap();
}

#[test]
fn build_requires_mappings_and_datasets() {
    let mut tagger = Tagger::<TestBackend>::new(config(), Default::default()).unwrap();
    assert!(matches!(tagger.build_model(), Err(TaggerError::Configuration(_))));

    tagger.set_mappings(mappings(), embeddings()).unwrap();
    assert!(matches!(tagger.build_model(), Err(TaggerError::Configuration(_))));
}

#[test]
fn rejects_inconsistent_configuration() {
    let mut tagger = Tagger::<TestBackend>::new(config(), Default::default()).unwrap();

    assert!(matches!(
        tagger.set_dataset(datasets(), data()),
        Err(TaggerError::Configuration(_))
    ));

    let too_small = EmbeddingMatrix::random(4, 5, &mut StdRng::seed_from_u64(0)).unwrap();
    assert!(matches!(
        tagger.set_mappings(mappings(), too_small),
        Err(TaggerError::Configuration(_))
    ));

    tagger.set_mappings(mappings(), embeddings()).unwrap();

    let unlabelled = BTreeMap::from([("name".to_string(), DatasetDescriptor::new("tags", true))]);
    assert!(matches!(
        tagger.set_dataset(unlabelled, data()),
        Err(TaggerError::Configuration(_))
    ));

    let mut extra = data();
    extra.insert("other".to_string(), DatasetSplits::default());
    assert!(matches!(
        tagger.set_dataset(datasets(), extra),
        Err(TaggerError::Configuration(_))
    ));
}

#[test]
fn rejects_malformed_records() {
    let malformed = [
        // Casing shorter than the tokens
        sentence(&["hello", "world"], vec![1, 2], vec![4], vec![0, 0]),
        // Token outside the embedding rows
        sentence(&["hello"], vec![40], vec![4], vec![0]),
        // Label outside the label mapping
        sentence(&["hello"], vec![1], vec![4], vec![7]),
        // Training sentence without labels
        SentenceRecord {
            tokens: vec![1],
            casing: vec![4],
            ..Default::default()
        },
    ];

    for record in malformed {
        let mut tagger = Tagger::<TestBackend>::new(config(), Default::default()).unwrap();
        tagger.set_mappings(mappings(), embeddings()).unwrap();

        let mut data = data();
        data.get_mut("name").unwrap().train.push(record);

        assert!(matches!(
            tagger.set_dataset(datasets(), data),
            Err(TaggerError::Data(_))
        ));
    }
}

#[test]
fn unknown_tokens_degrade_at_inference() {
    let tagger = built(config());

    let record = SentenceRecord::from_raw_tokens(&["Hello", "zyzzyva", "day"], tagger.mappings().unwrap())
        .unwrap();
    let out_of_range = SentenceRecord {
        tokens: vec![99, 1],
        casing: vec![4, 42],
        ..Default::default()
    };

    let labels = tagger.tag_sentences(&[record, out_of_range]).unwrap();

    assert_eq!(labels["name"][0].len(), 3);
    assert_eq!(labels["name"][1].len(), 2);
}

#[test]
fn empty_sentences_yield_empty_predictions() {
    let tagger = built(config().with_attention(Some(AttentionConfig::time())));

    let sentences = vec![SentenceRecord::default(), train_sentences().remove(0)];
    let predictions = tagger.predict(&sentences, true).unwrap();

    assert_eq!(predictions.labels["name"][0], Vec::<String>::new());
    assert_eq!(predictions.labels["name"][1].len(), 2);
    assert!(predictions.attention.unwrap()["name"][0].is_empty());
}

#[test]
fn tags_a_two_token_sentence_with_a_minimal_vocabulary() {
    let mappings = Mappings::new()
        .with(TOKENS, Mapping::from([("hello", 1), ("world", 2)]))
        .with(CASING, Mapping::from([("allLower", 4)]))
        .with("labels", Mapping::from([("O", 0), ("Claim", 1)]));

    let embeddings = EmbeddingMatrix::random(3, 5, &mut StdRng::seed_from_u64(1)).unwrap();
    let record = sentence(&["hello", "world"], vec![1, 2], vec![4, 4], vec![0, 1]);

    let mut tagger = Tagger::<TestBackend>::new(TaggerConfig::new(), Default::default()).unwrap();
    tagger.set_mappings(mappings, embeddings).unwrap();
    tagger
        .set_dataset(
            BTreeMap::from([("essays".to_string(), DatasetDescriptor::new("labels", false))]),
            BTreeMap::from([(
                "essays".to_string(),
                DatasetSplits {
                    train: vec![record.clone()],
                    ..Default::default()
                },
            )]),
        )
        .unwrap();

    tagger.build_model().unwrap();
    tagger.fit(1).unwrap();

    let labels = tagger.tag_sentences(&[record]).unwrap();

    assert_eq!(labels["essays"].len(), 1);
    assert_eq!(labels["essays"][0].len(), 2);
}

#[test]
fn reads_characters_with_either_encoder() {
    for encoding in [CharEncoding::Lstm, CharEncoding::Cnn] {
        let mut tagger = built(
            config()
                .with_char_embeddings_size(Some(6))
                .with_char_encoding(encoding)
                .with_char_lstm_size(4)
                .with_char_filters(5)
                .with_max_char_length(4),
        );
        tagger.fit(1).unwrap();

        // An empty surface form encodes to a zero character vector
        let sentences = vec![
            sentence(&["nice", ""], vec![4, 7], vec![4, 1], vec![1, 1]),
            sentence(&["wonderfully", "day"], vec![1, 7], vec![4, 4], vec![0, 0]),
        ];
        let labels = tagger.tag_sentences(&sentences).unwrap();

        assert_eq!(labels["name"][0].len(), 2);
        assert_eq!(labels["name"][1].len(), 2);
    }
}

#[test]
fn trains_one_head_per_dataset() {
    let mut mappings = mappings();
    mappings.insert("roles", Mapping::from([("none", 0), ("major", 1)]));

    let datasets = BTreeMap::from([
        ("name".to_string(), DatasetDescriptor::new("labels", true)),
        ("roles".to_string(), DatasetDescriptor::new("roles", false)),
    ]);

    let mut data = data();
    data.insert(
        "roles".to_string(),
        DatasetSplits {
            train: vec![SentenceRecord {
                tokens: vec![3, 5, 4],
                casing: vec![6, 4, 4],
                ..Default::default()
            }
            .with_labels("roles", vec![1, 0, 0])],
            ..Default::default()
        },
    );

    let mut tagger = Tagger::<TestBackend>::new(config(), Default::default()).unwrap();
    tagger.set_mappings(mappings, embeddings()).unwrap();
    tagger.set_dataset(datasets, data).unwrap();
    tagger.build_model().unwrap();

    let report = tagger.fit(1).unwrap();
    assert_eq!(report.epochs[0].train.len(), 2);
    assert!(!report.epochs[0].dev.contains_key("roles"));

    let labels = tagger.tag_sentences(&held_out()).unwrap();
    assert_eq!(labels.len(), 2);
    assert!(labels["roles"][0]
        .iter()
        .all(|label| label == "none" || label == "major"));
}

#[tokio::test]
async fn saved_taggers_predict_the_same_labels() {
    let mut tagger = built(config().with_attention(Some(AttentionConfig::feature())));
    tagger.fit(1).unwrap();

    let dir = std::env::temp_dir().join(format!("arg-bilstm-{}", rand::random::<u64>()));
    tagger.save(&dir).unwrap();

    let mut loaded = Tagger::<TestBackend>::load(&dir, Default::default()).await.unwrap();
    std::fs::remove_dir_all(&dir).ok();

    assert_eq!(loaded.state(), LifecycleState::Trained);
    assert_eq!(loaded.datasets(), tagger.datasets());

    let sentences = train_sentences();
    let expected = tagger.predict(&sentences, true).unwrap();
    let actual = loaded.predict(&sentences, true).unwrap();

    assert_eq!(actual.labels, expected.labels);

    let (expected, actual) = (expected.attention.unwrap(), actual.attention.unwrap());
    for (a, b) in expected["name"].iter().flatten().flatten().zip(actual["name"].iter().flatten().flatten()) {
        assert!((a - b).abs() < 1e-5);
    }

    // Restored taggers carry no sentences to train on
    assert!(matches!(loaded.fit(1), Err(TaggerError::Configuration(_))));
    assert_eq!(loaded.epochs_trained(), 1);
}

fn token_weights(tagger: &Tagger<TestBackend>) -> Vec<f32> {
    tensors::to_values(tagger.model().unwrap().encoder.tokens.weight.val())
}

fn head_weights(tagger: &Tagger<TestBackend>) -> Vec<f32> {
    tensors::to_values(tagger.model().unwrap().heads[0].weight.val())
}

#[test]
fn fitting_lowers_the_training_loss() {
    let mut tagger = built(config().with_dropout(0.0).with_learning_rate(1e-2));
    let heads = head_weights(&tagger);

    let report = tagger.fit(30).unwrap();

    let first = report.epochs[0].train["name"].loss;
    let last = report.epochs[29].train["name"].loss;
    assert!(last < first, "loss went from {first} to {last}");
    assert_ne!(head_weights(&tagger), heads);
}

#[test]
fn token_embeddings_train_only_when_fine_tuned() {
    let mut frozen = built(config());
    let before = token_weights(&frozen);
    frozen.fit(2).unwrap();
    assert_eq!(token_weights(&frozen), before);

    let mut tuned = built(config().with_fine_tune_embeddings(true));
    let before = token_weights(&tuned);
    tuned.fit(2).unwrap();
    assert_ne!(token_weights(&tuned), before);
}
