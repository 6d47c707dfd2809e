// Dear ImGui draw-data renderer for D3D11.
//
// Draws into whatever render target is bound on the context; the frame loop
// binds and clears the back-buffer view first. Vertex and index buffers are
// dynamic and grow on demand. The only texture is the font atlas.

use crate::error::{InitError, PlatformError, RuntimeError};
use imgui::{DrawCmd, DrawCmdParams, DrawData, DrawIdx, DrawVert, FontAtlas, TextureId};
use log::{debug, info};
use std::mem::{offset_of, size_of};
use std::ptr;
use std::slice;
use windows::core::{s, PCSTR};
use windows::Win32::Foundation::{E_POINTER, RECT};
use windows::Win32::Graphics::Direct3D::Fxc::D3DCompile;
use windows::Win32::Graphics::Direct3D::{ID3DBlob, D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST};
use windows::Win32::Graphics::Direct3D11::{
    ID3D11BlendState, ID3D11Buffer, ID3D11DepthStencilState, ID3D11Device, ID3D11DeviceContext,
    ID3D11InputLayout, ID3D11PixelShader, ID3D11RasterizerState, ID3D11SamplerState,
    ID3D11ShaderResourceView, ID3D11Texture2D, ID3D11VertexShader, D3D11_BIND_CONSTANT_BUFFER,
    D3D11_BIND_FLAG, D3D11_BIND_INDEX_BUFFER, D3D11_BIND_SHADER_RESOURCE,
    D3D11_BIND_VERTEX_BUFFER, D3D11_BLEND_DESC, D3D11_BLEND_INV_SRC_ALPHA, D3D11_BLEND_ONE,
    D3D11_BLEND_OP_ADD, D3D11_BLEND_SRC_ALPHA, D3D11_BUFFER_DESC, D3D11_COLOR_WRITE_ENABLE_ALL,
    D3D11_COMPARISON_ALWAYS, D3D11_CPU_ACCESS_WRITE, D3D11_CULL_NONE, D3D11_DEPTH_STENCILOP_DESC,
    D3D11_DEPTH_STENCIL_DESC, D3D11_DEPTH_WRITE_MASK_ALL, D3D11_FILL_SOLID,
    D3D11_FILTER_MIN_MAG_MIP_LINEAR, D3D11_INPUT_ELEMENT_DESC, D3D11_INPUT_PER_VERTEX_DATA,
    D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_WRITE_DISCARD, D3D11_RASTERIZER_DESC,
    D3D11_RENDER_TARGET_BLEND_DESC, D3D11_SAMPLER_DESC, D3D11_STENCIL_OP_KEEP,
    D3D11_SUBRESOURCE_DATA, D3D11_TEXTURE2D_DESC, D3D11_TEXTURE_ADDRESS_CLAMP,
    D3D11_USAGE_DEFAULT, D3D11_USAGE_DYNAMIC, D3D11_VIEWPORT,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_R16_UINT, DXGI_FORMAT_R32G32_FLOAT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_SAMPLE_DESC,
};

const VERTEX_SHADER: &str = r#"
cbuffer vertexBuffer : register(b0) { float4x4 ProjectionMatrix; };
struct VS_INPUT { float2 pos : POSITION; float4 col : COLOR0; float2 uv : TEXCOORD0; };
struct PS_INPUT { float4 pos : SV_POSITION; float4 col : COLOR0; float2 uv : TEXCOORD0; };
PS_INPUT main(VS_INPUT input) {
    PS_INPUT output;
    output.pos = mul(ProjectionMatrix, float4(input.pos.xy, 0.f, 1.f));
    output.col = input.col;
    output.uv = input.uv;
    return output;
}
"#;

const PIXEL_SHADER: &str = r#"
struct PS_INPUT { float4 pos : SV_POSITION; float4 col : COLOR0; float2 uv : TEXCOORD0; };
sampler sampler0;
Texture2D texture0;
float4 main(PS_INPUT input) : SV_Target {
    return input.col * texture0.Sample(sampler0, input.uv);
}
"#;

const FONT_TEXTURE_ID: usize = 1;
const VERTEX_HEADROOM: usize = 5000;
const INDEX_HEADROOM: usize = 10000;

fn init_failed(e: windows::core::Error) -> InitError {
    InitError::RendererCreationFailed(e.into())
}

fn render_failed(e: windows::core::Error) -> RuntimeError {
    RuntimeError::RenderFailed(e.into())
}

fn missing(what: &str) -> PlatformError {
    PlatformError::new(E_POINTER.0, format!("no {} returned", what))
}

fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe { slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize()) }
}

fn compile(source: &str, target: PCSTR) -> Result<ID3DBlob, InitError> {
    let mut code: Option<ID3DBlob> = None;
    let mut errors: Option<ID3DBlob> = None;
    let result = unsafe {
        D3DCompile(
            source.as_ptr().cast(),
            source.len(),
            PCSTR::null(),
            None,
            None,
            s!("main"),
            target,
            0,
            0,
            &mut code,
            Some(&mut errors),
        )
    };
    if let Err(e) = result {
        let message = errors
            .as_ref()
            .map(|blob| String::from_utf8_lossy(blob_bytes(blob)).trim_end().to_owned())
            .unwrap_or_else(|| e.message());
        return Err(InitError::RendererCreationFailed(PlatformError::new(e.code().0, message)));
    }
    code.ok_or_else(|| InitError::RendererCreationFailed(missing("shader bytecode")))
}

fn dynamic_buffer(
    device: &ID3D11Device,
    bytes: usize,
    bind: D3D11_BIND_FLAG,
) -> windows::core::Result<ID3D11Buffer> {
    let desc = D3D11_BUFFER_DESC {
        ByteWidth: bytes as u32,
        Usage: D3D11_USAGE_DYNAMIC,
        BindFlags: bind.0 as u32,
        CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
        ..Default::default()
    };
    let mut buffer = None;
    unsafe { device.CreateBuffer(&desc, None, Some(&mut buffer))? };
    buffer.ok_or_else(|| windows::core::Error::new(E_POINTER, "no buffer returned"))
}

/// Column-major orthographic projection covering the display rectangle.
fn projection(display_pos: [f32; 2], display_size: [f32; 2]) -> [[f32; 4]; 4] {
    let l = display_pos[0];
    let r = display_pos[0] + display_size[0];
    let t = display_pos[1];
    let b = display_pos[1] + display_size[1];
    [
        [2.0 / (r - l), 0.0, 0.0, 0.0],
        [0.0, 2.0 / (t - b), 0.0, 0.0],
        [0.0, 0.0, 0.5, 0.0],
        [(r + l) / (l - r), (t + b) / (b - t), 0.5, 1.0],
    ]
}

pub struct Renderer {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    vertex_shader: ID3D11VertexShader,
    input_layout: ID3D11InputLayout,
    constant_buffer: ID3D11Buffer,
    pixel_shader: ID3D11PixelShader,
    sampler: ID3D11SamplerState,
    blend_state: ID3D11BlendState,
    rasterizer_state: ID3D11RasterizerState,
    depth_stencil_state: ID3D11DepthStencilState,
    font_view: ID3D11ShaderResourceView,
    vertex_buffer: ID3D11Buffer,
    vertex_capacity: usize,
    index_buffer: ID3D11Buffer,
    index_capacity: usize,
}

impl Renderer {
    /// Build the pipeline state and upload the font atlas from `fonts`.
    pub fn new(
        device: &ID3D11Device,
        context: &ID3D11DeviceContext,
        fonts: &mut FontAtlas,
    ) -> Result<Self, InitError> {
        let vs_code = compile(VERTEX_SHADER, s!("vs_4_0"))?;
        let ps_code = compile(PIXEL_SHADER, s!("ps_4_0"))?;

        unsafe {
            let mut vertex_shader = None;
            device
                .CreateVertexShader(blob_bytes(&vs_code), None, Some(&mut vertex_shader))
                .map_err(init_failed)?;

            let layout = [
                D3D11_INPUT_ELEMENT_DESC {
                    SemanticName: s!("POSITION"),
                    SemanticIndex: 0,
                    Format: DXGI_FORMAT_R32G32_FLOAT,
                    InputSlot: 0,
                    AlignedByteOffset: offset_of!(DrawVert, pos) as u32,
                    InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                    InstanceDataStepRate: 0,
                },
                D3D11_INPUT_ELEMENT_DESC {
                    SemanticName: s!("TEXCOORD"),
                    SemanticIndex: 0,
                    Format: DXGI_FORMAT_R32G32_FLOAT,
                    InputSlot: 0,
                    AlignedByteOffset: offset_of!(DrawVert, uv) as u32,
                    InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                    InstanceDataStepRate: 0,
                },
                D3D11_INPUT_ELEMENT_DESC {
                    SemanticName: s!("COLOR"),
                    SemanticIndex: 0,
                    Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                    InputSlot: 0,
                    AlignedByteOffset: offset_of!(DrawVert, col) as u32,
                    InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                    InstanceDataStepRate: 0,
                },
            ];
            let mut input_layout = None;
            device
                .CreateInputLayout(&layout, blob_bytes(&vs_code), Some(&mut input_layout))
                .map_err(init_failed)?;

            let constant_buffer = dynamic_buffer(
                device,
                size_of::<[[f32; 4]; 4]>(),
                D3D11_BIND_CONSTANT_BUFFER,
            )
            .map_err(init_failed)?;

            let mut pixel_shader = None;
            device
                .CreatePixelShader(blob_bytes(&ps_code), None, Some(&mut pixel_shader))
                .map_err(init_failed)?;

            // Straight-alpha GUI colors onto a premultiplied surface.
            let mut blend_desc = D3D11_BLEND_DESC::default();
            blend_desc.RenderTarget[0] = D3D11_RENDER_TARGET_BLEND_DESC {
                BlendEnable: true.into(),
                SrcBlend: D3D11_BLEND_SRC_ALPHA,
                DestBlend: D3D11_BLEND_INV_SRC_ALPHA,
                BlendOp: D3D11_BLEND_OP_ADD,
                SrcBlendAlpha: D3D11_BLEND_ONE,
                DestBlendAlpha: D3D11_BLEND_INV_SRC_ALPHA,
                BlendOpAlpha: D3D11_BLEND_OP_ADD,
                RenderTargetWriteMask: D3D11_COLOR_WRITE_ENABLE_ALL.0 as u8,
            };
            let mut blend_state = None;
            device
                .CreateBlendState(&blend_desc, Some(&mut blend_state))
                .map_err(init_failed)?;

            let rasterizer_desc = D3D11_RASTERIZER_DESC {
                FillMode: D3D11_FILL_SOLID,
                CullMode: D3D11_CULL_NONE,
                ScissorEnable: true.into(),
                DepthClipEnable: true.into(),
                ..Default::default()
            };
            let mut rasterizer_state = None;
            device
                .CreateRasterizerState(&rasterizer_desc, Some(&mut rasterizer_state))
                .map_err(init_failed)?;

            let keep = D3D11_DEPTH_STENCILOP_DESC {
                StencilFailOp: D3D11_STENCIL_OP_KEEP,
                StencilDepthFailOp: D3D11_STENCIL_OP_KEEP,
                StencilPassOp: D3D11_STENCIL_OP_KEEP,
                StencilFunc: D3D11_COMPARISON_ALWAYS,
            };
            let depth_desc = D3D11_DEPTH_STENCIL_DESC {
                DepthEnable: false.into(),
                DepthWriteMask: D3D11_DEPTH_WRITE_MASK_ALL,
                DepthFunc: D3D11_COMPARISON_ALWAYS,
                StencilEnable: false.into(),
                FrontFace: keep,
                BackFace: keep,
                ..Default::default()
            };
            let mut depth_stencil_state = None;
            device
                .CreateDepthStencilState(&depth_desc, Some(&mut depth_stencil_state))
                .map_err(init_failed)?;

            let sampler_desc = D3D11_SAMPLER_DESC {
                Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
                AddressU: D3D11_TEXTURE_ADDRESS_CLAMP,
                AddressV: D3D11_TEXTURE_ADDRESS_CLAMP,
                AddressW: D3D11_TEXTURE_ADDRESS_CLAMP,
                ComparisonFunc: D3D11_COMPARISON_ALWAYS,
                ..Default::default()
            };
            let mut sampler = None;
            device
                .CreateSamplerState(&sampler_desc, Some(&mut sampler))
                .map_err(init_failed)?;

            let font_view = Self::upload_fonts(device, fonts)?;

            let vertex_buffer = dynamic_buffer(
                device,
                VERTEX_HEADROOM * size_of::<DrawVert>(),
                D3D11_BIND_VERTEX_BUFFER,
            )
            .map_err(init_failed)?;
            let index_buffer = dynamic_buffer(
                device,
                INDEX_HEADROOM * size_of::<DrawIdx>(),
                D3D11_BIND_INDEX_BUFFER,
            )
            .map_err(init_failed)?;

            let fail = |what| InitError::RendererCreationFailed(missing(what));
            info!("GUI renderer created");
            Ok(Self {
                device: device.clone(),
                context: context.clone(),
                vertex_shader: vertex_shader.ok_or_else(|| fail("vertex shader"))?,
                input_layout: input_layout.ok_or_else(|| fail("input layout"))?,
                constant_buffer,
                pixel_shader: pixel_shader.ok_or_else(|| fail("pixel shader"))?,
                sampler: sampler.ok_or_else(|| fail("sampler"))?,
                blend_state: blend_state.ok_or_else(|| fail("blend state"))?,
                rasterizer_state: rasterizer_state.ok_or_else(|| fail("rasterizer state"))?,
                depth_stencil_state: depth_stencil_state
                    .ok_or_else(|| fail("depth stencil state"))?,
                font_view,
                vertex_buffer,
                vertex_capacity: VERTEX_HEADROOM,
                index_buffer,
                index_capacity: INDEX_HEADROOM,
            })
        }
    }

    fn upload_fonts(
        device: &ID3D11Device,
        fonts: &mut FontAtlas,
    ) -> Result<ID3D11ShaderResourceView, InitError> {
        let atlas = fonts.build_rgba32_texture();
        let desc = D3D11_TEXTURE2D_DESC {
            Width: atlas.width,
            Height: atlas.height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_R8G8B8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
            ..Default::default()
        };
        let data = D3D11_SUBRESOURCE_DATA {
            pSysMem: atlas.data.as_ptr().cast(),
            SysMemPitch: atlas.width * 4,
            SysMemSlicePitch: 0,
        };
        debug!("Uploading {}x{} font atlas", atlas.width, atlas.height);

        let view = unsafe {
            let mut texture: Option<ID3D11Texture2D> = None;
            device
                .CreateTexture2D(&desc, Some(&data), Some(&mut texture))
                .map_err(init_failed)?;
            let texture = texture
                .ok_or_else(|| InitError::RendererCreationFailed(missing("font texture")))?;

            let mut view = None;
            device
                .CreateShaderResourceView(&texture, None, Some(&mut view))
                .map_err(init_failed)?;
            view.ok_or_else(|| InitError::RendererCreationFailed(missing("font view")))?
        };

        fonts.tex_id = TextureId::new(FONT_TEXTURE_ID);
        fonts.clear_tex_data();
        Ok(view)
    }

    /// Draw `draw_data` into the bound render target.
    pub fn render(&mut self, draw_data: &DrawData) -> Result<(), RuntimeError> {
        let [width, height] = draw_data.display_size;
        if width <= 0.0 || height <= 0.0 || draw_data.total_vtx_count == 0 {
            return Ok(());
        }

        self.reserve(
            draw_data.total_vtx_count as usize,
            draw_data.total_idx_count as usize,
        )?;
        self.upload(draw_data)?;
        self.setup_state(draw_data);

        let clip_off = draw_data.display_pos;
        let clip_scale = draw_data.framebuffer_scale;
        let mut vertex_base = 0;
        let mut index_base = 0;
        for list in draw_data.draw_lists() {
            for cmd in list.commands() {
                match cmd {
                    DrawCmd::Elements {
                        count,
                        cmd_params:
                            DrawCmdParams {
                                clip_rect,
                                vtx_offset,
                                idx_offset,
                                ..
                            },
                    } => {
                        let left = (clip_rect[0] - clip_off[0]) * clip_scale[0];
                        let top = (clip_rect[1] - clip_off[1]) * clip_scale[1];
                        let right = (clip_rect[2] - clip_off[0]) * clip_scale[0];
                        let bottom = (clip_rect[3] - clip_off[1]) * clip_scale[1];
                        if right <= left || bottom <= top {
                            continue;
                        }
                        let scissor = RECT {
                            left: left as i32,
                            top: top as i32,
                            right: right as i32,
                            bottom: bottom as i32,
                        };
                        unsafe {
                            self.context.RSSetScissorRects(Some(&[scissor]));
                            self.context.DrawIndexed(
                                count as u32,
                                (index_base + idx_offset) as u32,
                                (vertex_base + vtx_offset) as i32,
                            );
                        }
                    }
                    DrawCmd::ResetRenderState => self.setup_state(draw_data),
                    DrawCmd::RawCallback { callback, raw_cmd } => unsafe {
                        callback(list.raw(), raw_cmd)
                    },
                }
            }
            vertex_base += list.vtx_buffer().len();
            index_base += list.idx_buffer().len();
        }
        Ok(())
    }

    fn reserve(&mut self, vertices: usize, indices: usize) -> Result<(), RuntimeError> {
        if vertices > self.vertex_capacity {
            let capacity = vertices + VERTEX_HEADROOM;
            self.vertex_buffer = dynamic_buffer(
                &self.device,
                capacity * size_of::<DrawVert>(),
                D3D11_BIND_VERTEX_BUFFER,
            )
            .map_err(render_failed)?;
            self.vertex_capacity = capacity;
            debug!("Vertex buffer grown to {} vertices", capacity);
        }
        if indices > self.index_capacity {
            let capacity = indices + INDEX_HEADROOM;
            self.index_buffer = dynamic_buffer(
                &self.device,
                capacity * size_of::<DrawIdx>(),
                D3D11_BIND_INDEX_BUFFER,
            )
            .map_err(render_failed)?;
            self.index_capacity = capacity;
            debug!("Index buffer grown to {} indices", capacity);
        }
        Ok(())
    }

    fn upload(&self, draw_data: &DrawData) -> Result<(), RuntimeError> {
        unsafe {
            let mut vertices = D3D11_MAPPED_SUBRESOURCE::default();
            self.context
                .Map(&self.vertex_buffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut vertices))
                .map_err(render_failed)?;
            let mut indices = D3D11_MAPPED_SUBRESOURCE::default();
            if let Err(e) = self.context.Map(
                &self.index_buffer,
                0,
                D3D11_MAP_WRITE_DISCARD,
                0,
                Some(&mut indices),
            ) {
                self.context.Unmap(&self.vertex_buffer, 0);
                return Err(render_failed(e));
            }

            let mut vtx_dst = vertices.pData as *mut DrawVert;
            let mut idx_dst = indices.pData as *mut DrawIdx;
            for list in draw_data.draw_lists() {
                let vtx = list.vtx_buffer();
                let idx = list.idx_buffer();
                ptr::copy_nonoverlapping(vtx.as_ptr(), vtx_dst, vtx.len());
                ptr::copy_nonoverlapping(idx.as_ptr(), idx_dst, idx.len());
                vtx_dst = vtx_dst.add(vtx.len());
                idx_dst = idx_dst.add(idx.len());
            }
            self.context.Unmap(&self.vertex_buffer, 0);
            self.context.Unmap(&self.index_buffer, 0);

            let mut constants = D3D11_MAPPED_SUBRESOURCE::default();
            self.context
                .Map(&self.constant_buffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut constants))
                .map_err(render_failed)?;
            let mvp = projection(draw_data.display_pos, draw_data.display_size);
            ptr::write(constants.pData as *mut [[f32; 4]; 4], mvp);
            self.context.Unmap(&self.constant_buffer, 0);
        }
        Ok(())
    }

    fn setup_state(&self, draw_data: &DrawData) {
        let viewport = D3D11_VIEWPORT {
            TopLeftX: 0.0,
            TopLeftY: 0.0,
            Width: draw_data.display_size[0] * draw_data.framebuffer_scale[0],
            Height: draw_data.display_size[1] * draw_data.framebuffer_scale[1],
            MinDepth: 0.0,
            MaxDepth: 1.0,
        };
        let stride = size_of::<DrawVert>() as u32;
        let offset = 0u32;
        unsafe {
            let ctx = &self.context;
            ctx.RSSetViewports(Some(&[viewport]));
            ctx.IASetInputLayout(&self.input_layout);
            ctx.IASetVertexBuffers(
                0,
                1,
                Some(&Some(self.vertex_buffer.clone())),
                Some(&stride),
                Some(&offset),
            );
            ctx.IASetIndexBuffer(&self.index_buffer, DXGI_FORMAT_R16_UINT, 0);
            ctx.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            ctx.VSSetShader(&self.vertex_shader, None);
            ctx.VSSetConstantBuffers(0, Some(&[Some(self.constant_buffer.clone())]));
            ctx.PSSetShader(&self.pixel_shader, None);
            ctx.PSSetSamplers(0, Some(&[Some(self.sampler.clone())]));
            ctx.PSSetShaderResources(0, Some(&[Some(self.font_view.clone())]));
            ctx.OMSetBlendState(&self.blend_state, Some(&[0.0; 4]), 0xFFFF_FFFF);
            ctx.OMSetDepthStencilState(&self.depth_stencil_state, 0);
            ctx.RSSetState(&self.rasterizer_state);
        }
    }
}
