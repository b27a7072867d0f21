//! Train a small two-layer MLP on synthetic batches and dump a memory
//! profile. The data is noise, so the model only learns the label prior,
//! but the whole engine is exercised: lazy graphs, broadcast, autograd,
//! in-place parameter updates.

use preguica::nn::{self, Module};
use preguica::optim::{GradientDescent, Optimizer};
use preguica::{enable_memory_profile, save_memory_profile, seed_rng, Array, PgResult};

struct Mlp {
    linear1: nn::Linear,
    linear2: nn::Linear,
}

impl Mlp {
    fn new() -> PgResult<Self> {
        Ok(Mlp {
            linear1: nn::Linear::new(784, 128)?,
            linear2: nn::Linear::new(128, 10)?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, input: &Array) -> PgResult<Array> {
        let hidden = nn::relu(&self.linear1.forward(input)?)?;
        self.linear2.forward(&hidden)
    }

    fn parameters(&self) -> Vec<Array> {
        let mut params = self.linear1.parameters();
        params.extend(self.linear2.parameters());
        params
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    seed_rng(7);
    enable_memory_profile();

    println!("🏋️ preguiça MLP demo: 784 -> 128 -> 10 on synthetic batches");

    let model = Mlp::new()?;
    let optimizer = GradientDescent::new(1e-3);

    for step in 0..10 {
        let input = Array::normal(&[64, 784])?;
        let labels = Array::randint(&[64], 0, 10)?;

        let logits = model.forward(&input)?;
        let loss = nn::cross_entropy_loss(&logits, &labels)?;
        let loss_value = loss.item()?.to_f32();
        loss.backward()?;
        optimizer.update(&model.parameters())?;

        println!("step {step}: loss = {loss_value:.4}");
    }

    save_memory_profile("memory_profile.json")?;
    println!("✅ memory profile written to memory_profile.json");
    Ok(())
}
