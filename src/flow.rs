//! 흐름 제어
//!
//! RTT가 임계값을 넘으면 Bad 모드(저속)로 떨어지고,
//! 페널티 시간 동안 양호한 상태가 유지되면 Good 모드(고속)로 복귀

use tracing::info;

use crate::Config;

/// 기본 페널티 시간 (초)
const DEFAULT_PENALTY_TIME: f64 = 4.0;

/// 페널티 최소값 (초)
const MIN_PENALTY_TIME: f64 = 1.0;

/// 페널티 최대값 (초)
const MAX_PENALTY_TIME: f64 = 60.0;

/// 이 시간 안에 다시 나빠지면 페널티 2배 (초)
const PENALTY_DOUBLE_WINDOW: f64 = 10.0;

/// 페널티 감소 주기 (초)
const PENALTY_REDUCTION_PERIOD: f64 = 10.0;

/// 흐름 제어 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowMode {
    Good,
    Bad,
}

/// 2단계 흐름 제어기
#[derive(Debug, Clone)]
pub struct FlowControl {
    mode: FlowMode,
    penalty_time: f64,
    good_conditions_time: f64,
    penalty_reduction_accumulator: f64,

    rtt_threshold_ms: f64,
    good_send_rate: f64,
    bad_send_rate: f64,
}

impl FlowControl {
    pub fn new(config: &Config) -> Self {
        Self {
            mode: FlowMode::Bad,
            penalty_time: DEFAULT_PENALTY_TIME,
            good_conditions_time: 0.0,
            penalty_reduction_accumulator: 0.0,
            rtt_threshold_ms: config.rtt_threshold_ms,
            good_send_rate: config.good_send_rate,
            bad_send_rate: config.bad_send_rate,
        }
    }

    /// Bad 모드, 기본 페널티로 복귀 (연결 끊김 시)
    pub fn reset(&mut self) {
        self.mode = FlowMode::Bad;
        self.penalty_time = DEFAULT_PENALTY_TIME;
        self.good_conditions_time = 0.0;
        self.penalty_reduction_accumulator = 0.0;
    }

    // 호출 위치: 연결 중 매 타임스텝
    pub fn update(&mut self, dt: f64, rtt_ms: f64) {
        if self.mode == FlowMode::Good {
            if rtt_ms > self.rtt_threshold_ms {
                info!("*** dropping to bad mode (rtt {:.1}ms) ***", rtt_ms);
                self.mode = FlowMode::Bad;
                if self.good_conditions_time < PENALTY_DOUBLE_WINDOW
                    && self.penalty_time < MAX_PENALTY_TIME
                {
                    self.penalty_time = (self.penalty_time * 2.0).min(MAX_PENALTY_TIME);
                    info!("penalty time increased to {:.1}", self.penalty_time);
                }
                self.good_conditions_time = 0.0;
                self.penalty_reduction_accumulator = 0.0;
                return;
            }

            self.good_conditions_time += dt;
            self.penalty_reduction_accumulator += dt;

            if self.penalty_reduction_accumulator > PENALTY_REDUCTION_PERIOD
                && self.penalty_time > MIN_PENALTY_TIME
            {
                self.penalty_time = (self.penalty_time / 2.0).max(MIN_PENALTY_TIME);
                info!("penalty time reduced to {:.1}", self.penalty_time);
                self.penalty_reduction_accumulator = 0.0;
            }
            return;
        }

        if rtt_ms <= self.rtt_threshold_ms {
            self.good_conditions_time += dt;
        } else {
            self.good_conditions_time = 0.0;
        }

        if self.good_conditions_time > self.penalty_time {
            info!("*** upgrading to good mode ***");
            self.good_conditions_time = 0.0;
            self.penalty_reduction_accumulator = 0.0;
            self.mode = FlowMode::Good;
        }
    }

    /// 현재 모드의 전송률 (패킷/초)
    pub fn send_rate(&self) -> f64 {
        match self.mode {
            FlowMode::Good => self.good_send_rate,
            FlowMode::Bad => self.bad_send_rate,
        }
    }

    pub fn mode(&self) -> FlowMode {
        self.mode
    }

    pub fn penalty_time(&self) -> f64 {
        self.penalty_time
    }

    pub fn good_conditions_time(&self) -> f64 {
        self.good_conditions_time
    }
}
