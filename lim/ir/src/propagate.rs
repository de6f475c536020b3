//! Incremental propagation of bit level information through the design.
//!
//! Forward propagation moves constant and identity information from buses to
//! the ports they drive and through each component to its buses. Backward
//! propagation moves don't-care information from ports to the buses driving
//! them. Every function reports whether anything changed; callers iterate to a
//! fixed point.
use crate::{
    Bit, BusIdx, CompIdx, ComponentKind, Design, GateKind, OpKind, PortIdx,
    Value,
};
use lim_utils::{Error, LimResult};

impl Design {
    // ========================= Buses ============================

    /// Merge `incoming` into the value of `bus`. The first push establishes
    /// the width of the bus.
    pub fn push_bus_forward(
        &mut self,
        bus: BusIdx,
        incoming: &Value,
    ) -> LimResult<bool> {
        if self.bus(bus).forced {
            return Err(Error::illegal_state(format!(
                "cannot propagate through forced bus {}",
                self.bus(bus).name
            )));
        }
        if self.bus(bus).value.is_none() {
            self.set_bus_size(bus, incoming.size(), incoming.is_signed())?;
        }
        let b = &mut self.buses[bus];
        let Some(value) = b.value.as_mut() else {
            unreachable!()
        };
        if value.size() != incoming.size() {
            return Err(Error::size_mismatch(
                format!("forward propagation into bus {}", b.name),
                value.size(),
                incoming.size(),
            ));
        }
        if value.is_signed() != incoming.is_signed() {
            return Err(Error::illegal_state(format!(
                "forward propagation into bus {} changes its sign",
                b.name
            )));
        }
        let mut modified = false;
        for i in 0..value.size() {
            let cur = value.bit(i);
            let new = incoming.bit(i);
            if cur == new || !cur.is_care() || !new.is_care() {
                continue;
            }
            let bit = if new.is_constant() {
                new
            } else if new.is_global() {
                Bit::local(bus, i)
            } else {
                new
            };
            if bit != cur {
                log::trace!("bus {}[{i}]: {cur:?} -> {bit:?}", b.name);
                value.set_bit(i, bit);
                modified = true;
            }
        }
        Ok(modified)
    }

    /// Downgrade bits of `bus` that none of its consumers care about. The
    /// consumers are the connected ports or, without any, the ports of the
    /// dependencies naming the bus.
    pub fn push_bus_backward(&mut self, bus: BusIdx) -> LimResult<bool> {
        let b = self.bus(bus);
        if b.forced {
            return Err(Error::illegal_state(format!(
                "cannot propagate through forced bus {}",
                b.name
            )));
        }
        let Some(value) = &b.value else {
            return Ok(false);
        };
        let targets: Vec<PortIdx> = if b.ports.is_empty() {
            b.logical_dependents
                .iter()
                .map(|d| self.dep(*d).port)
                .collect()
        } else {
            b.ports.clone()
        };
        if targets.is_empty() {
            return Ok(false);
        }
        let mut downgrade = Vec::new();
        for i in 0..value.size() {
            if !value.is_care(i) {
                continue;
            }
            let mut dont_care = false;
            let mut care = false;
            for port in &targets {
                match &self.port(*port).value {
                    Some(v) if i < v.size() => {
                        if v.is_care(i) {
                            care = true;
                        } else {
                            dont_care = true;
                        }
                    }
                    // Ports without a value yet do not vote.
                    _ => {}
                }
            }
            if dont_care && !care {
                downgrade.push(i);
            }
        }
        let b = &mut self.buses[bus];
        let Some(value) = b.value.as_mut() else {
            return Ok(false);
        };
        for i in &downgrade {
            log::trace!("bus {}[{i}]: don't care", b.name);
            value.set_bit(*i, Bit::DontCare);
        }
        Ok(!downgrade.is_empty())
    }

    // ========================= Ports ============================

    /// The value `port` receives: the value of its bus when connected,
    /// otherwise the merge of the sources of every dependency on it. The
    /// flag is false when some source has no value yet.
    fn port_input(&self, port: PortIdx) -> Option<(Value, bool)> {
        if let Some(bus) = self.port(port).bus {
            return self.bus(bus).value.clone().map(|v| (v, true));
        }
        let mut complete = true;
        let mut values: Vec<&Value> = Vec::new();
        for dep in self.port_dependencies(port) {
            match &self.bus(self.dep(dep).logical_bus).value {
                Some(v) => values.push(v),
                None => complete = false,
            }
        }
        let first = values.first()?;
        let mut bits = Vec::with_capacity(first.size());
        for i in 0..first.size() {
            let all_dont_care = values
                .iter()
                .all(|v| i < v.size() && !v.is_care(i));
            let bit = if all_dont_care {
                Bit::DontCare
            } else if values
                .iter()
                .all(|v| i < v.size() && v.bit(i) == first.bit(i))
            {
                first.bit(i)
            } else {
                Bit::Care
            };
            bits.push(bit);
        }
        Some((Value::from_bits(bits, first.is_signed()), complete))
    }

    /// Pull the value driving `port` into it.
    pub fn push_port_forward(&mut self, port: PortIdx) -> LimResult<bool> {
        let Some((incoming, complete)) = self.port_input(port) else {
            return Ok(false);
        };
        self.merge_into_port(port, &incoming, complete)
    }

    /// Update the bits of `port` from `incoming`. A port without a value
    /// takes on the width of `incoming`. Constant and don't-care bits of the
    /// port are final.
    pub(crate) fn merge_into_port(
        &mut self,
        port: PortIdx,
        incoming: &Value,
        complete: bool,
    ) -> LimResult<bool> {
        let mut modified = false;
        if self.port(port).value.is_none() {
            self.set_port_size(port, incoming.size(), incoming.is_signed())?;
            modified = true;
        }
        let p = &mut self.ports[port];
        let Some(value) = p.value.as_mut() else {
            unreachable!()
        };
        if value.size() != incoming.size() {
            return Err(Error::size_mismatch(
                format!("forward propagation into port {}", p.name),
                value.size(),
                incoming.size(),
            ));
        }
        if !complete {
            return Ok(modified);
        }
        for i in 0..value.size() {
            let cur = value.bit(i);
            if cur == incoming.bit(i) || !cur.is_care() || cur.is_constant() {
                continue;
            }
            log::trace!("port {}[{i}]: {cur:?} -> {:?}", p.name, incoming.bit(i));
            value.set_bit_from(i, incoming, i);
            modified = true;
        }
        Ok(modified)
    }

    /// Downgrade the care bits of `port` wherever `v` does not care.
    pub fn push_port_backward(&mut self, port: PortIdx, v: &Value) -> bool {
        let p = &mut self.ports[port];
        let Some(value) = p.value.as_mut() else {
            return false;
        };
        let mut modified = false;
        for i in 0..value.size().min(v.size()) {
            if value.is_care(i) && !v.is_care(i) {
                value.set_bit(i, Bit::DontCare);
                modified = true;
            }
        }
        modified
    }

    // ========================= Components ============================

    /// Pull values into every port of `comp` and compute the values of its
    /// buses.
    pub fn push_values_forward(&mut self, comp: CompIdx) -> LimResult<bool> {
        let mut modified = false;
        let ports: Vec<PortIdx> = self.comp(comp).ports().collect();
        for port in ports {
            modified |= self.push_port_forward(port)?;
        }
        modified |= match &self.comp(comp).kind {
            ComponentKind::Constant(v) => {
                let v = v.clone();
                self.push_result(comp, &v)?
            }
            ComponentKind::Op(op) => {
                let op = *op;
                self.op_forward(comp, op)?
            }
            ComponentKind::Gate(g) => {
                let g = *g;
                self.gate_forward(comp, g)?
            }
            ComponentKind::Reg(reg) => {
                match self.port(reg.data).value.clone() {
                    Some(v) => self.push_result(comp, &Value::generic(&v))?,
                    None => false,
                }
            }
            ComponentKind::Mux(mux) => {
                let inputs: Vec<Value> = mux
                    .pairs
                    .iter()
                    .filter_map(|(_, data)| self.port(*data).value.clone())
                    .collect();
                let mut merged: Option<Value> = None;
                for v in inputs {
                    merged = Some(match merged {
                        Some(m) => m.union(&v)?,
                        None => v,
                    });
                }
                match merged {
                    Some(v) => self.push_result(comp, &Value::generic(&v))?,
                    None => false,
                }
            }
            ComponentKind::Call(_) => self.call_forward(comp)?,
            ComponentKind::InBuf(_) => self.in_buf_forward(comp)?,
            ComponentKind::OutBuf(_) => self.out_buf_forward(comp)?,
            ComponentKind::NoOp
            | ComponentKind::Referee(_)
            | ComponentKind::Module(_) => false,
        };
        Ok(modified)
    }

    /// Downgrade the buses of `comp` that nothing consumes and propagate the
    /// don't-care information to its ports.
    pub fn push_values_backward(&mut self, comp: CompIdx) -> LimResult<bool> {
        let mut modified = false;
        if !matches!(self.comp(comp).kind, ComponentKind::OutBuf(_)) {
            for bus in self.component_buses(comp) {
                modified |= self.push_bus_backward(bus)?;
            }
        }
        modified |= match &self.comp(comp).kind {
            ComponentKind::Op(op) => {
                let op = *op;
                self.op_backward(comp, op)
            }
            ComponentKind::Gate(GateKind::And | GateKind::Or | GateKind::Xor) => {
                self.bitwise_backward(comp)
            }
            ComponentKind::Reg(reg) => {
                let data = reg.data;
                match self.result_value(comp) {
                    Some(v) => self.push_port_backward(data, &v),
                    None => false,
                }
            }
            ComponentKind::Call(call) => {
                let pairs: Vec<(PortIdx, PortIdx)> =
                    call.ports.iter().map(|(c, b)| (*c, *b)).collect();
                let mut modified = false;
                for (call_port, body_port) in pairs {
                    if let Some(v) = self.port(body_port).value.clone() {
                        modified |= self.push_port_backward(call_port, &v);
                    }
                }
                modified
            }
            ComponentKind::InBuf(_) => {
                let exit = self.main_exit(comp);
                let buses = self.exit_buses(exit);
                let mut modified = false;
                for bus in buses {
                    let b = self.bus(bus);
                    if let (Some(v), Some(peer)) = (b.value.clone(), b.peer) {
                        modified |= self.push_port_backward(peer, &v);
                    }
                }
                modified
            }
            ComponentKind::OutBuf(_) => {
                let ports: Vec<PortIdx> = self.comp(comp).ports().collect();
                let mut modified = false;
                for port in ports {
                    let Some(peer) = self.port(port).peer else {
                        continue;
                    };
                    if let Some(v) = self.bus(peer).value.clone() {
                        modified |= self.push_port_backward(port, &v);
                    }
                }
                modified
            }
            _ => false,
        };
        Ok(modified)
    }

    fn result_value(&self, comp: CompIdx) -> Option<Value> {
        self.result_bus(comp)
            .and_then(|b| self.bus(b).value.clone())
    }

    fn push_result(&mut self, comp: CompIdx, v: &Value) -> LimResult<bool> {
        match self.result_bus(comp) {
            Some(bus) => self.push_bus_forward(bus, v),
            None => Ok(false),
        }
    }

    /// Values of every data port, or None while one is still unknown.
    fn data_inputs(&self, comp: CompIdx) -> Option<Vec<Value>> {
        self.comp(comp)
            .data_ports
            .iter()
            .map(|p| self.port(*p).value.clone())
            .collect()
    }

    /// Width and sign of the result: the result bus when it is sized,
    /// otherwise the widest input.
    fn result_shape(&self, comp: CompIdx, inputs: &[Value]) -> (usize, bool) {
        if let Some(v) = self.result_value(comp) {
            return (v.size(), v.is_signed());
        }
        let size = inputs.iter().map(Value::size).max().unwrap_or(1);
        let signed = inputs.iter().any(Value::is_signed);
        (size, signed)
    }

    fn op_forward(&mut self, comp: CompIdx, op: OpKind) -> LimResult<bool> {
        let Some(inputs) = self.data_inputs(comp) else {
            return Ok(false);
        };
        if inputs.len() < op.arity() {
            return Err(Error::malformed_structure(format!(
                "{} has {} inputs, expected {}",
                self.describe(comp),
                inputs.len(),
                op.arity()
            )));
        }
        let (size, signed) = if op.is_comparison() {
            (1, false)
        } else {
            match op {
                OpKind::Cast { size, signed }
                | OpKind::NumericPromotion { size, signed } => (size, signed),
                _ => self.result_shape(comp, &inputs),
            }
        };
        let result = compute_op(op, &inputs, size, signed);
        self.push_result(comp, &result)
    }

    fn gate_forward(&mut self, comp: CompIdx, gate: GateKind) -> LimResult<bool> {
        let Some(inputs) = self.data_inputs(comp) else {
            return Ok(false);
        };
        let Some(first) = inputs.first() else {
            return Ok(false);
        };
        let (size, signed) = self.result_shape(comp, &inputs);
        let mut acc = first.resized(size, signed);
        let result = match gate {
            GateKind::Not => invert(&acc),
            GateKind::And | GateKind::Or | GateKind::Xor => {
                for v in &inputs[1..] {
                    acc = bitwise(gate, &acc, &v.resized(size, signed));
                }
                acc
            }
        };
        self.push_result(comp, &result)
    }

    /// Move the values of every call site into the procedure body and the
    /// values of the body back out to this call.
    fn call_forward(&mut self, comp: CompIdx) -> LimResult<bool> {
        let ComponentKind::Call(call) = &self.comp(comp).kind else {
            return Ok(false);
        };
        let procedure = call.procedure;
        let port_pairs: Vec<(PortIdx, PortIdx)> =
            call.ports.iter().map(|(c, b)| (*c, *b)).collect();
        let bus_pairs: Vec<(BusIdx, BusIdx)> =
            call.buses.iter().map(|(c, b)| (*c, *b)).collect();
        let mut modified = false;

        for (call_port, body_port) in port_pairs {
            let mut merged: Option<Value> = None;
            for other in self.procedure(procedure).calls().to_vec() {
                let ComponentKind::Call(data) = &self.comp(other).kind else {
                    continue;
                };
                let Some(port) = data
                    .ports
                    .iter()
                    .find(|(_, b)| **b == body_port)
                    .map(|(c, _)| *c)
                else {
                    continue;
                };
                let Some(v) = self.port(port).value.clone() else {
                    merged = None;
                    break;
                };
                let v = Value::generic(&v);
                merged = Some(match merged {
                    Some(m) => m.union(&v)?,
                    None => v,
                });
            }
            if self.port(call_port).value.is_none() {
                continue;
            }
            if let Some(v) = merged {
                modified |= self.merge_into_port(body_port, &v, true)?;
            }
        }

        for (call_bus, body_bus) in bus_pairs {
            if let Some(v) = self.bus(body_bus).value.clone() {
                modified |= self.push_bus_forward(call_bus, &Value::generic(&v))?;
            }
        }
        Ok(modified)
    }

    /// True if the module owning the boundary buffer `comp` is only reachable
    /// through calls, in which case no local bit may cross its boundary.
    fn is_opaque_boundary(&self, comp: CompIdx) -> bool {
        match self.comp(comp).owner {
            Some(module) => self.comp(module).owner.is_none(),
            None => true,
        }
    }

    /// Copy into the value of `bus` the bits of `pushed` that may cross a
    /// module boundary.
    fn cross_boundary(
        &mut self,
        bus: BusIdx,
        pushed: &Value,
        opaque: bool,
    ) -> LimResult<bool> {
        let mut modified = false;
        if self.bus(bus).value.is_none() {
            self.set_bus_size(bus, pushed.size(), pushed.is_signed())?;
            modified = true;
        }
        let b = &mut self.buses[bus];
        let Some(value) = b.value.as_mut() else {
            unreachable!()
        };
        if value.size() != pushed.size() {
            return Err(Error::size_mismatch(
                format!("boundary crossing into bus {}", b.name),
                value.size(),
                pushed.size(),
            ));
        }
        for i in 0..value.size() {
            if value.bit_equals(i, pushed, i) || !value.is_care(i) {
                continue;
            }
            let bit = pushed.bit(i);
            let adopt = if opaque {
                bit.is_constant()
            } else {
                bit.is_constant() || !bit.is_global()
            };
            if adopt {
                value.set_bit(i, bit);
                modified = true;
            }
        }
        Ok(modified)
    }

    fn in_buf_forward(&mut self, comp: CompIdx) -> LimResult<bool> {
        let opaque = self.is_opaque_boundary(comp);
        let exit = self.main_exit(comp);
        let mut modified = false;
        for bus in self.exit_buses(exit) {
            let Some(peer) = self.bus(bus).peer else {
                continue;
            };
            if let Some(v) = self.port(peer).value.clone() {
                modified |= self.cross_boundary(bus, &v, opaque)?;
            }
        }
        Ok(modified)
    }

    fn out_buf_forward(&mut self, comp: CompIdx) -> LimResult<bool> {
        let opaque = self.is_opaque_boundary(comp);
        let c = self.comp(comp);
        let (clock, reset) = (c.clock, c.reset);
        let ports: Vec<PortIdx> =
            c.ports().filter(|p| *p != clock && *p != reset).collect();
        let mut modified = false;
        for port in ports {
            let p = self.port(port);
            // An unused go port has no value.
            let (Some(peer), Some(pushed)) = (p.peer, p.value.clone()) else {
                continue;
            };
            modified |= self.cross_boundary(peer, &pushed, opaque)?;

            // Extend the most significant information bit upward.
            let compacted = pushed.compacted_size();
            let Some(value) = self.buses[peer].value.as_mut() else {
                continue;
            };
            if compacted > 0 && value.compacted_size() != compacted {
                let top = value.bit(compacted - 1);
                for i in compacted..value.size() {
                    if value.is_care(i) && value.bit(i) != top {
                        value.set_bit(i, top);
                        modified = true;
                    }
                }
            }
        }
        Ok(modified)
    }

    fn op_backward(&mut self, comp: CompIdx, op: OpKind) -> bool {
        let Some(result) = self.result_value(comp) else {
            return false;
        };
        let ports = self.comp(comp).data_ports.clone();
        let mask = if op.is_bitwise() {
            bitwise_care(&result)
        } else {
            match op {
                OpKind::Add | OpKind::Subtract | OpKind::Multiply => {
                    arithmetic_care(&result)
                }
                OpKind::Cast { .. } | OpKind::NumericPromotion { .. } => {
                    result.clone()
                }
                _ => return false,
            }
        };
        let mut modified = false;
        for port in ports {
            modified |= self.push_port_backward(port, &mask);
        }
        modified
    }

    fn bitwise_backward(&mut self, comp: CompIdx) -> bool {
        let Some(result) = self.result_value(comp) else {
            return false;
        };
        let mask = bitwise_care(&result);
        let mut modified = false;
        for port in self.comp(comp).data_ports.clone() {
            modified |= self.push_port_backward(port, &mask);
        }
        modified
    }
}

/// Care exactly where `result` has a non-constant care bit.
fn bitwise_care(result: &Value) -> Value {
    let bits = result
        .bits()
        .iter()
        .map(|b| {
            if b.is_care() && !b.is_constant() {
                Bit::Care
            } else {
                Bit::DontCare
            }
        })
        .collect();
    Value::from_bits(bits, result.is_signed())
}

/// Carries only move upward, so an input bit matters when some result bit at
/// or above it does.
fn arithmetic_care(result: &Value) -> Value {
    let mut bits = vec![Bit::DontCare; result.size()];
    let mut care = false;
    for i in (0..result.size()).rev() {
        care |= result.is_care(i);
        if care {
            bits[i] = Bit::Care;
        }
    }
    Value::from_bits(bits, result.is_signed())
}

fn invert(v: &Value) -> Value {
    Value::from_bits(v.bits().iter().map(|b| b.invert()).collect(), v.is_signed())
}

fn bitwise(gate: GateKind, a: &Value, b: &Value) -> Value {
    let bits = a
        .bits()
        .iter()
        .zip(b.bits())
        .map(|(x, y)| bitwise_bit(gate, *x, *y))
        .collect();
    Value::from_bits(bits, a.is_signed())
}

fn bitwise_bit(gate: GateKind, a: Bit, b: Bit) -> Bit {
    if !a.is_care() || !b.is_care() {
        return Bit::DontCare;
    }
    if a.is_constant() && b.is_constant() {
        let (x, y) = (a.is_on(), b.is_on());
        return Bit::constant(match gate {
            GateKind::And => x && y,
            GateKind::Or => x || y,
            GateKind::Xor => x ^ y,
            GateKind::Not => !x,
        });
    }
    match gate {
        GateKind::And => {
            if a.is_on() {
                b
            } else if b.is_on() {
                a
            } else if a.is_off() || b.is_off() {
                Bit::Zero
            } else if a == b && !a.is_global() {
                a
            } else {
                Bit::Care
            }
        }
        GateKind::Or => {
            if a.is_off() {
                b
            } else if b.is_off() {
                a
            } else if a.is_on() || b.is_on() {
                Bit::One
            } else if a == b && !a.is_global() {
                a
            } else {
                Bit::Care
            }
        }
        GateKind::Xor => {
            if a.is_off() {
                b
            } else if b.is_off() {
                a
            } else if a.is_on() {
                b.invert()
            } else if b.is_on() {
                a.invert()
            } else if a == b && !a.is_global() {
                Bit::Zero
            } else if a == b.invert() && !a.is_global() {
                Bit::One
            } else {
                Bit::Care
            }
        }
        GateKind::Not => a.invert(),
    }
}

fn shifted(op: OpKind, v: &Value, amount: usize) -> Value {
    let size = v.size();
    let msb = v.bit(size - 1);
    let bits = (0..size)
        .map(|i| match op {
            OpKind::LeftShift => {
                if i < amount {
                    Bit::Zero
                } else {
                    v.bit(i - amount)
                }
            }
            OpKind::RightShift if v.is_signed() => {
                if i + amount < size {
                    v.bit(i + amount)
                } else {
                    msb
                }
            }
            _ => {
                if i + amount < size {
                    v.bit(i + amount)
                } else {
                    Bit::Zero
                }
            }
        })
        .collect();
    Value::from_bits(bits, v.is_signed())
}

/// Fold two constant operands.
fn fold(op: OpKind, a: i64, b: i64) -> Option<i64> {
    let r = match op {
        OpKind::Add => a.wrapping_add(b),
        OpKind::Subtract => a.wrapping_sub(b),
        OpKind::Multiply => a.wrapping_mul(b),
        OpKind::Divide => a.checked_div(b)?,
        OpKind::Modulo => a.checked_rem(b)?,
        OpKind::Equal => (a == b) as i64,
        OpKind::NotEqual => (a != b) as i64,
        OpKind::LessThan => (a < b) as i64,
        OpKind::LessThanEqual => (a <= b) as i64,
        OpKind::GreaterThan => (a > b) as i64,
        OpKind::GreaterThanEqual => (a >= b) as i64,
        OpKind::ConditionalAnd => (a != 0 && b != 0) as i64,
        OpKind::ConditionalOr => (a != 0 || b != 0) as i64,
        _ => return None,
    };
    Some(r)
}

/// The result of `op` over `inputs` as a value of `size` bits.
fn compute_op(op: OpKind, inputs: &[Value], size: usize, signed: bool) -> Value {
    let unknown = Value::new(size, signed);
    match op {
        OpKind::And | OpKind::Or | OpKind::Xor => {
            let gate = match op {
                OpKind::And => GateKind::And,
                OpKind::Or => GateKind::Or,
                _ => GateKind::Xor,
            };
            bitwise(
                gate,
                &inputs[0].resized(size, signed),
                &inputs[1].resized(size, signed),
            )
        }
        OpKind::Complement => invert(&inputs[0].resized(size, signed)),
        OpKind::Cast { .. } | OpKind::NumericPromotion { .. } => {
            inputs[0].resized(size, signed)
        }
        OpKind::Not => match inputs[0].as_i64() {
            Some(a) => Value::constant((a == 0) as i64, 1, false),
            None => unknown,
        },
        OpKind::Minus => match inputs[0].as_i64() {
            Some(a) => {
                Value::constant(a.wrapping_neg(), size, signed).resized(size, signed)
            }
            None => unknown,
        },
        OpKind::LeftShift | OpKind::RightShift | OpKind::RightShiftUnsigned => {
            match inputs[1].as_i64() {
                Some(amount) if amount >= 0 => shifted(
                    op,
                    &inputs[0].resized(size, signed),
                    amount as usize,
                ),
                _ => unknown,
            }
        }
        _ => match (inputs[0].as_i64(), inputs[1].as_i64()) {
            (Some(a), Some(b)) => match fold(op, a, b) {
                Some(r) => Value::constant(r, size, signed).resized(size, signed),
                None => unknown,
            },
            _ => unknown,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DepKind, Design};

    fn wire(design: &mut Design, from: CompIdx, to: CompIdx, idx: usize) {
        let bus = design.result_bus(from).unwrap();
        let port = design.comp(to).data_ports()[idx];
        let entry = match design.comp(to).entries().first() {
            Some(e) => *e,
            None => design.make_entry(to, None),
        };
        design.add_dependency(entry, port, bus, DepKind::Data).unwrap();
    }

    #[test]
    fn constant_sum_is_folded() {
        let mut design = Design::new("test");
        let a = design.make_constant("a", 3, 8, true).unwrap();
        let b = design.make_constant("b", 5, 8, true).unwrap();
        let add = design.make_op("add", OpKind::Add, 8, true).unwrap();
        wire(&mut design, a, add, 0);
        wire(&mut design, b, add, 1);
        for c in [a, b, add] {
            design.push_values_forward(c).unwrap();
        }
        let result = design.bus(design.result_bus(add).unwrap()).value().unwrap();
        assert_eq!(result.size(), 8);
        assert!(result.is_constant());
        assert_eq!(result.as_i64(), Some(8));
        assert!(!design.push_values_forward(add).unwrap());
    }

    #[test]
    fn and_with_zero_mask_is_zero() {
        let mut design = Design::new("test");
        let mask = design.make_constant("mask", 0x0f, 8, false).unwrap();
        let other = design.make_noop("src").unwrap();
        let exit = design.main_exit(other);
        let data = design.make_data_bus(exit);
        design.set_bus_size(data, 8, false).unwrap();
        let and = design.make_op("and", OpKind::And, 8, false).unwrap();
        let port = design.comp(and).data_ports()[0];
        design.connect(port, data);
        wire(&mut design, mask, and, 1);
        design.push_values_forward(mask).unwrap();
        design.push_values_forward(and).unwrap();
        let result = design.bus(design.result_bus(and).unwrap()).value().unwrap();
        for i in 0..4 {
            assert_eq!(result.bit(i), Bit::local(data, i));
        }
        for i in 4..8 {
            assert_eq!(result.bit(i), Bit::Zero);
        }
    }

    #[test]
    fn unused_result_bits_flow_backward() {
        let mut design = Design::new("test");
        let add = design.make_op("add", OpKind::Add, 4, false).unwrap();
        let cast = design
            .make_op("cast", OpKind::Cast { size: 2, signed: false }, 2, false)
            .unwrap();
        let sum = design.result_bus(add).unwrap();
        let cast_in = design.comp(cast).data_ports()[0];
        design.connect(cast_in, sum);
        design.push_values_forward(cast).unwrap();
        let shrink = Value::parse("xxcc", false).unwrap();
        assert!(design.push_port_backward(cast_in, &shrink));
        assert!(design.push_values_backward(add).unwrap());
        let v = design.bus(sum).value().unwrap();
        assert!(!v.is_care(3) && !v.is_care(2));
        assert!(v.is_care(1) && v.is_care(0));
    }

    #[test]
    fn unsized_consumers_do_not_keep_bits_alive() {
        let mut design = Design::new("test");
        let add = design.make_op("add", OpKind::Add, 4, false).unwrap();
        let cast = design
            .make_op("cast", OpKind::Cast { size: 2, signed: false }, 2, false)
            .unwrap();
        let sink = design.make_noop("sink").unwrap();
        let sum = design.result_bus(add).unwrap();
        let cast_in = design.comp(cast).data_ports()[0];
        let sink_in = design.make_data_port(sink);
        design.connect(cast_in, sum);
        design.connect(sink_in, sum);
        design.push_values_forward(cast).unwrap();
        assert!(design.port(sink_in).value().is_none());
        let shrink = Value::parse("xxcc", false).unwrap();
        design.push_port_backward(cast_in, &shrink);
        assert!(design.push_bus_backward(sum).unwrap());
        let v = design.bus(sum).value().unwrap();
        assert!(!v.is_care(3) && !v.is_care(2));
        assert!(v.is_care(1) && v.is_care(0));
    }

    #[test]
    fn forced_bus_rejects_propagation() {
        let mut design = Design::new("test");
        let c = design.make_constant("c", 1, 4, false).unwrap();
        let bus = design.result_bus(c).unwrap();
        assert!(design.force_bus_value(bus, Value::new(0, false)).is_err());
        design
            .force_bus_value(bus, Value::constant(1, 2, false))
            .unwrap();
        assert!(design.push_values_forward(c).is_err());
        assert!(design.push_bus_backward(bus).is_err());
    }

    #[test]
    fn shifts_by_constant_amounts() {
        let v = Value::parse("1c01", true).unwrap();
        assert_eq!(shifted(OpKind::LeftShift, &v, 1).to_string(), " 4'[C010]+/-");
        assert_eq!(shifted(OpKind::RightShift, &v, 2).to_string(), " 4'[111C]+/-");
        assert_eq!(
            shifted(OpKind::RightShiftUnsigned, &v, 2).to_string(),
            " 4'[001C]+/-"
        );
    }
}
