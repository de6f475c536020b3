//! Constructors for the leaf components.
use crate::{
    CompIdx, ComponentKind, ControlFlags, Design, GateKind, Latency, MuxData,
    OpKind, PortIdx, RegData, Value,
};
use lim_utils::{Id, LimResult};

impl Design {
    /// A leaf with `inputs` data ports and a DONE exit with one data bus of
    /// `width` bits.
    fn make_leaf(
        &mut self,
        prefix: &str,
        kind: ComponentKind,
        flags: ControlFlags,
        inputs: usize,
        width: usize,
        signed: bool,
    ) -> LimResult<CompIdx> {
        let name = self.namegen.gen_name(prefix);
        let comp = self.alloc_component(name, kind, flags);
        for _ in 0..inputs {
            self.make_data_port(comp);
        }
        let exit = self.make_exit(comp, crate::ExitTag::DONE, 1)?;
        let result = self.exit(exit).data_buses[0];
        self.set_bus_size(result, width, signed)?;
        Ok(comp)
    }

    /// A constant driving `value` as a `width` bit value.
    pub fn make_constant(
        &mut self,
        prefix: &str,
        value: i64,
        width: usize,
        signed: bool,
    ) -> LimResult<CompIdx> {
        let v = Value::constant(value, width, signed).resized(width, signed);
        self.make_constant_value(prefix, v)
    }

    /// A constant driving an arbitrary value, possibly with don't-care bits.
    pub fn make_constant_value(
        &mut self,
        prefix: &str,
        value: Value,
    ) -> LimResult<CompIdx> {
        let (size, signed) = (value.size(), value.is_signed());
        self.make_leaf(
            prefix,
            ComponentKind::Constant(value),
            ControlFlags::COMBINATIONAL,
            0,
            size,
            signed,
        )
    }

    /// An operator producing a `width` bit result. Comparisons always produce
    /// a single unsigned bit and conversions their target width.
    pub fn make_op(
        &mut self,
        prefix: &str,
        op: OpKind,
        width: usize,
        signed: bool,
    ) -> LimResult<CompIdx> {
        let (width, signed) = if op.is_comparison() {
            (1, false)
        } else {
            match op {
                OpKind::Cast { size, signed }
                | OpKind::NumericPromotion { size, signed } => (size, signed),
                _ => (width, signed),
            }
        };
        self.make_leaf(
            prefix,
            ComponentKind::Op(op),
            ControlFlags::COMBINATIONAL,
            op.arity(),
            width,
            signed,
        )
    }

    /// A single bit gate. `Not` gates always have one input.
    pub fn make_gate(
        &mut self,
        prefix: &str,
        gate: GateKind,
        inputs: usize,
    ) -> LimResult<CompIdx> {
        let inputs = if gate == GateKind::Not { 1 } else { inputs };
        self.make_leaf(
            prefix,
            ComponentKind::Gate(gate),
            ControlFlags::COMBINATIONAL,
            inputs,
            1,
            false,
        )
    }

    /// A register with data, set, internal reset and enable ports. Its result
    /// appears one clock after its inputs.
    pub fn make_reg(
        &mut self,
        prefix: &str,
        width: usize,
        signed: bool,
    ) -> LimResult<CompIdx> {
        let name = self.namegen.gen_name(prefix);
        let comp = self.alloc_component(
            name,
            ComponentKind::NoOp,
            ControlFlags {
                consumes_go: false,
                produces_done: false,
                consumes_clock: true,
                consumes_reset: true,
            },
        );
        let mut ports: Vec<PortIdx> = Vec::with_capacity(4);
        for port_name in ["data", "set", "ireset", "enable"] {
            let port = self.make_data_port(comp);
            self.port_mut(port).name = Id::new(port_name);
            ports.push(port);
        }
        self.comp_mut(comp).kind = ComponentKind::Reg(RegData {
            data: ports[0],
            set: ports[1],
            internal_reset: ports[2],
            enable: ports[3],
            init: None,
        });
        let exit = self.make_exit(comp, crate::ExitTag::DONE, 1)?;
        self.exit_mut(exit).latency = Latency::ONE;
        let result = self.exit(exit).data_buses[0];
        self.set_bus_size(result, width, signed)?;
        Ok(comp)
    }

    /// A multiplexer with `inputs` select and data port pairs.
    pub fn make_mux(
        &mut self,
        prefix: &str,
        inputs: usize,
        width: usize,
        signed: bool,
    ) -> LimResult<CompIdx> {
        let comp = self.make_leaf(
            prefix,
            ComponentKind::Mux(MuxData::default()),
            ControlFlags::COMBINATIONAL,
            0,
            width,
            signed,
        )?;
        let mut pairs = Vec::with_capacity(inputs);
        for i in 0..inputs {
            let select = self.make_data_port(comp);
            self.port_mut(select).name = Id::new(format!("sel{i}"));
            let data = self.make_data_port(comp);
            self.port_mut(data).name = Id::new(format!("data{i}"));
            pairs.push((select, data));
        }
        self.comp_mut(comp).kind = ComponentKind::Mux(MuxData { pairs });
        Ok(comp)
    }

    /// A component that does nothing but complete.
    pub fn make_noop(&mut self, prefix: &str) -> LimResult<CompIdx> {
        let name = self.namegen.gen_name(prefix);
        let comp = self.alloc_component(
            name,
            ComponentKind::NoOp,
            ControlFlags::COMBINATIONAL,
        );
        self.make_exit(comp, crate::ExitTag::DONE, 0)?;
        Ok(comp)
    }
}

#[cfg(test)]
mod tests {
    use crate::{ComponentKind, Design, GateKind, OpKind};

    #[test]
    fn leaves_have_sized_results() {
        let mut design = Design::new("test");
        let lt = design.make_op("lt", OpKind::LessThan, 32, true).unwrap();
        let lt_bus = design.result_bus(lt).unwrap();
        assert_eq!(design.bus(lt_bus).size(), 1);
        assert_eq!(design.comp(lt).data_ports().len(), 2);

        let not = design.make_gate("not", GateKind::Not, 3).unwrap();
        assert_eq!(design.comp(not).data_ports().len(), 1);

        let reg = design.make_reg("reg", 16, false).unwrap();
        assert!(design.latency(reg).is_fixed());
        assert_eq!(design.latency(reg).min_clocks(), 1);
        match &design.comp(reg).kind {
            ComponentKind::Reg(r) => {
                assert_eq!(design.port(r.enable).name, "enable")
            }
            _ => panic!("expected a register"),
        }
    }

    #[test]
    fn names_are_unique() {
        let mut design = Design::new("test");
        let a = design.make_noop("nop").unwrap();
        let b = design.make_noop("nop").unwrap();
        assert_ne!(design.comp(a).name, design.comp(b).name);
    }
}
