use std::time::{Duration, Instant};

// Fixed timestep loop, see https://gafferongames.com/post/fix_your_timestep/

pub trait Simulation {
    fn tick(&mut self, time: &TickTime) -> anyhow::Result<()>;
}

pub struct TickTime {
    pub now: Instant,
    pub tick: u64,
    pub elapsed_time_s: f64,
}

pub struct TickLoop<S: Simulation> {
    pub simulation: S,

    previous_instant: Instant,
    accumulated_time_s: f64,
    fixed_time_step_s: f64,
    max_frame_time_s: f64,
    running_time_s: f64,
    number_of_ticks: u64,
}

impl<S: Simulation> TickLoop<S> {
    pub fn new(simulation: S, ticks_per_s: u32) -> Self {
        let fixed_time_step_s = 1.0 / ticks_per_s as f64;

        Self {
            simulation,
            previous_instant: Instant::now(),
            accumulated_time_s: 0.0,
            fixed_time_step_s,
            // Never try to catch up on more than a handful of ticks at once
            max_frame_time_s: fixed_time_step_s * 5.0,
            running_time_s: 0.0,
            number_of_ticks: 0,
        }
    }

    /// Runs every tick that is due, at most `max_ticks` in total over the loop's lifetime.
    pub fn next_frame(&mut self, max_ticks: u64) -> anyhow::Result<()> {
        let current_instant = Instant::now();
        let elapsed_s = current_instant
            .duration_since(self.previous_instant)
            .as_secs_f64()
            .min(self.max_frame_time_s);
        self.previous_instant = current_instant;

        self.running_time_s += elapsed_s;
        self.accumulated_time_s += elapsed_s;

        while self.accumulated_time_s >= self.fixed_time_step_s && self.number_of_ticks < max_ticks
        {
            let time = TickTime {
                now: Instant::now(),
                tick: self.number_of_ticks,
                elapsed_time_s: self.running_time_s,
            };
            self.simulation.tick(&time)?;
            self.accumulated_time_s -= self.fixed_time_step_s;
            self.number_of_ticks += 1;
        }

        Ok(())
    }

    /// Time until the next tick is due.
    pub fn time_to_next_tick(&self) -> Duration {
        let remaining_s = (self.fixed_time_step_s - self.accumulated_time_s).max(0.0);
        Duration::from_secs_f64(remaining_s)
    }

    pub fn number_of_ticks(&self) -> u64 {
        self.number_of_ticks
    }

    pub fn running_time_s(&self) -> f64 {
        self.running_time_s
    }
}
