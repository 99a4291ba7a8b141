// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

#[macro_use]
extern crate criterion;

use criterion::{BatchSize, Criterion};
use ipa_pdp::{
    parameters::PdpParameters,
    proof::InnerProductProof,
    statement::ProofStatement,
    witness::{BlockWitness, FileKey},
    Challenge,
    FileId,
    Pdp,
    BLOCK_SIZE,
    PDP_VERSION,
};
use rand_chacha::ChaCha12Rng;
use rand_core::{CryptoRngCore, RngCore, SeedableRng};

// Parameters
const BLOCK_SIZES: [usize; 3] = [64 * 64, 64 * 1024, BLOCK_SIZE];
const BATCH_SIZES: [usize; 2] = [2, 32];

// Generate random blocks of one file, with their witnesses, statements, and challenges
fn generate_data<R: CryptoRngCore>(
    params: &PdpParameters,
    b: usize,
    rng: &mut R,
) -> (FileKey, Vec<BlockWitness>, Vec<ProofStatement>, Vec<Challenge>) {
    let mut file_id: FileId = [0u8; 32];
    rng.fill_bytes(&mut file_id);
    let file_key = FileKey::new(params, &file_id).unwrap();

    let mut witnesses = Vec::with_capacity(b);
    let mut statements = Vec::with_capacity(b);
    let mut challenges = Vec::with_capacity(b);
    for i in 0..b {
        let mut block = vec![0u8; params.get_block_size()];
        rng.fill_bytes(&mut block);
        let witness = BlockWitness::new(params, &block).unwrap();
        let challenge = Challenge {
            index: i as u32,
            rand: rng.next_u32(),
        };
        statements.push(ProofStatement::new_with_point(
            &file_id,
            &witness.compute_tag_point(params, &file_key),
            &challenge,
        ));
        witnesses.push(witness);
        challenges.push(challenge);
    }

    (file_key, witnesses, statements, challenges)
}

fn generate_tag(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_tag");
    let mut rng = ChaCha12Rng::seed_from_u64(8675309);

    for block_size in BLOCK_SIZES {
        let params = PdpParameters::new_with_block_size(block_size).unwrap();

        let label = format!("Generate tag: block size = {} (n = {})", block_size, params.get_n());
        group.bench_function(&label, |b| {
            let (file_key, _, _, _) = generate_data(&params, 0, &mut rng);

            b.iter_batched_ref(
                || {
                    let mut block = vec![0u8; block_size];
                    rng.fill_bytes(&mut block);
                    block
                },
                |block| {
                    // Decompose and commit to the block
                    BlockWitness::new(&params, block)
                        .unwrap()
                        .compute_tag(&params, &file_key);
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn generate_proof(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_proof");
    let mut rng = ChaCha12Rng::seed_from_u64(8675309);

    for block_size in BLOCK_SIZES {
        let params = PdpParameters::new_with_block_size(block_size).unwrap();

        let label = format!("Generate proof: block size = {} (n = {})", block_size, params.get_n());
        group.bench_function(&label, |b| {
            let (file_key, witnesses, _, challenges) = generate_data(&params, 1, &mut rng);

            b.iter(|| {
                InnerProductProof::prove(&params, &file_key, &witnesses[0], &challenges[0]).unwrap();
            })
        });
    }
    group.finish();
}

fn verify_proof(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_proof");
    let mut rng = ChaCha12Rng::seed_from_u64(8675309);

    for block_size in BLOCK_SIZES {
        let params = PdpParameters::new_with_block_size(block_size).unwrap();

        let label = format!("Verify proof: block size = {} (n = {})", block_size, params.get_n());
        group.bench_function(&label, |b| {
            let (file_key, witnesses, statements, challenges) = generate_data(&params, 1, &mut rng);
            let proof = InnerProductProof::prove(&params, &file_key, &witnesses[0], &challenges[0]).unwrap();

            b.iter(|| {
                assert!(proof.verify(&params, &statements[0]).is_ok());
            })
        });
    }
    group.finish();
}

fn verify_batch_proof(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_batch_proof");
    let mut rng = ChaCha12Rng::seed_from_u64(8675309);

    for block_size in BLOCK_SIZES {
        let params = PdpParameters::new_with_block_size(block_size).unwrap();

        for batch in BATCH_SIZES {
            let label = format!(
                "Verify batch proof: block size = {} (n = {}), {}-batch",
                block_size,
                params.get_n(),
                batch
            );
            group.bench_function(&label, |b| {
                let (file_key, witnesses, statements, challenges) = generate_data(&params, batch, &mut rng);
                let proofs = witnesses
                    .iter()
                    .zip(challenges.iter())
                    .map(|(w, c)| InnerProductProof::prove(&params, &file_key, w, c).unwrap())
                    .collect::<Vec<InnerProductProof>>();

                b.iter(|| {
                    assert!(InnerProductProof::verify_batch(&params, &statements, &proofs).is_ok());
                })
            });
        }
    }
    group.finish();
}

fn verify_serialized_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_serialized_batch");
    let mut rng = ChaCha12Rng::seed_from_u64(8675309);

    // The facade decodes proofs and tags before verifying
    let pdp = Pdp::new(PDP_VERSION).unwrap();
    let params = pdp.get_parameters().clone();
    for batch in BATCH_SIZES {
        let label = format!("Verify serialized batch: {}-batch", batch);
        group.bench_function(&label, |b| {
            let (file_key, witnesses, _, challenges) = generate_data(&params, batch, &mut rng);
            let file_ids = vec![*file_key.get_file_id(); batch];
            let tags = witnesses
                .iter()
                .map(|w| w.compute_tag(&params, &file_key))
                .collect::<Vec<_>>();
            let proofs = witnesses
                .iter()
                .zip(challenges.iter())
                .flat_map(|(w, c)| {
                    InnerProductProof::prove(&params, &file_key, w, c)
                        .unwrap()
                        .to_bytes()
                })
                .collect::<Vec<u8>>();

            b.iter(|| {
                assert!(pdp.proof_verify(&proofs, &file_ids, &tags, &challenges));
            })
        });
    }
    group.finish();
}

criterion_group! {
    name = generate;
    config = Criterion::default().sample_size(10);
    targets = generate_tag, generate_proof
}

criterion_group! {
    name = verify;
    config = Criterion::default().sample_size(10);
    targets = verify_proof, verify_batch_proof, verify_serialized_batch
}

criterion_main!(generate, verify);
